use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub mod defs;
pub mod mapping;

pub use defs::RenormDivisors;
use defs::{LabelTableDef, builtin_label_tables};

/// Estimator-agnostic cell categories shared by every vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Category {
    #[serde(rename = "B")]
    B,
    #[serde(rename = "CD4")]
    Cd4,
    #[serde(rename = "CD8")]
    Cd8,
    #[serde(rename = "NK")]
    Nk,
    #[serde(rename = "Mono/Macro")]
    MonoMacro,
    #[serde(rename = "Neutrophil")]
    Neutrophil,
}

/// Category kept from the designated estimator in non-protein mode.
pub const RESERVED_CATEGORY: Category = Category::Neutrophil;

impl Category {
    pub const ALL: [Category; 6] = [
        Category::B,
        Category::Cd4,
        Category::Cd8,
        Category::Nk,
        Category::MonoMacro,
        Category::Neutrophil,
    ];

    pub const WITHOUT_RESERVED: [Category; 5] = [
        Category::B,
        Category::Cd4,
        Category::Cd8,
        Category::Nk,
        Category::MonoMacro,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::B => "B",
            Category::Cd4 => "CD4",
            Category::Cd8 => "CD8",
            Category::Nk => "NK",
            Category::MonoMacro => "Mono/Macro",
            Category::Neutrophil => "Neutrophil",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorId {
    Lm22,
    Epic,
    Quantiseq,
}

/// Estimator whose own Neutrophil estimate is kept in non-protein mode.
pub const DESIGNATED_BASE: EstimatorId = EstimatorId::Quantiseq;

impl EstimatorId {
    pub const ALL: [EstimatorId; 3] = [EstimatorId::Lm22, EstimatorId::Epic, EstimatorId::Quantiseq];

    pub fn name(self) -> &'static str {
        match self {
            EstimatorId::Lm22 => "lm22",
            EstimatorId::Epic => "epic",
            EstimatorId::Quantiseq => "quantiseq",
        }
    }
}

impl fmt::Display for EstimatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EstimatorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lm22" | "cibersort" => Ok(EstimatorId::Lm22),
            "epic" => Ok(EstimatorId::Epic),
            "quantiseq" => Ok(EstimatorId::Quantiseq),
            other => Err(format!(
                "unknown estimator {other} (use lm22|epic|quantiseq)"
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LabelTableError {
    #[error("label table {estimator}: label {label:?} assigned to both {first} and {second}")]
    DuplicateLabel {
        estimator: EstimatorId,
        label: String,
        first: Category,
        second: Category,
    },
    #[error("label table {estimator}: category {category} has no labels")]
    EmptyCategory {
        estimator: EstimatorId,
        category: Category,
    },
    #[error("label table {estimator}: category {category} listed twice")]
    DuplicateCategory {
        estimator: EstimatorId,
        category: Category,
    },
    #[error("no label table defined for {0}")]
    Missing(EstimatorId),
}

/// Validated label -> category lookup for one estimator vocabulary.
#[derive(Debug, Clone)]
pub struct LabelTable {
    pub estimator: EstimatorId,
    by_label: HashMap<&'static str, Category>,
}

impl LabelTable {
    pub fn load(def: &LabelTableDef) -> Result<Self, LabelTableError> {
        let mut by_label: HashMap<&'static str, Category> = HashMap::new();
        let mut seen_categories = Vec::with_capacity(def.categories.len());
        for entry in def.categories {
            if seen_categories.contains(&entry.category) {
                return Err(LabelTableError::DuplicateCategory {
                    estimator: def.estimator,
                    category: entry.category,
                });
            }
            seen_categories.push(entry.category);
            if entry.labels.is_empty() {
                return Err(LabelTableError::EmptyCategory {
                    estimator: def.estimator,
                    category: entry.category,
                });
            }
            for &label in entry.labels {
                if let Some(first) = by_label.insert(label, entry.category) {
                    return Err(LabelTableError::DuplicateLabel {
                        estimator: def.estimator,
                        label: label.to_string(),
                        first,
                        second: entry.category,
                    });
                }
            }
        }
        Ok(Self {
            estimator: def.estimator,
            by_label,
        })
    }

    pub fn category_of(&self, label: &str) -> Option<Category> {
        self.by_label.get(label.trim()).copied()
    }
}

/// Label tables for every estimator, validated once at construction.
#[derive(Debug, Clone)]
pub struct LabelTables {
    tables: BTreeMap<EstimatorId, LabelTable>,
}

impl LabelTables {
    pub fn builtin() -> Result<Self, LabelTableError> {
        Self::from_defs(builtin_label_tables())
    }

    pub fn from_defs(defs: &[LabelTableDef]) -> Result<Self, LabelTableError> {
        let mut tables = BTreeMap::new();
        for def in defs {
            tables.insert(def.estimator, LabelTable::load(def)?);
        }
        for id in EstimatorId::ALL {
            if !tables.contains_key(&id) {
                return Err(LabelTableError::Missing(id));
            }
        }
        Ok(Self { tables })
    }

    pub fn get(&self, id: EstimatorId) -> Option<&LabelTable> {
        self.tables.get(&id)
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/markers/tests.rs"]
mod tests;
