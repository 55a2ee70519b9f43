use crate::markers::{Category, EstimatorId};

#[derive(Debug, Clone, Copy)]
pub struct CategoryLabels {
    pub category: Category,
    pub labels: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct LabelTableDef {
    pub estimator: EstimatorId,
    pub categories: &'static [CategoryLabels],
}

const LM22_B: &[&str] = &["B cells naive", "B cells memory", "Plasma cells"];
const LM22_CD4: &[&str] = &[
    "T cells CD4 naive",
    "T cells CD4 memory resting",
    "T cells CD4 memory activated",
    "T cells follicular helper",
    "T cells regulatory (Tregs)",
];
const LM22_CD8: &[&str] = &["T cells CD8"];
const LM22_NK: &[&str] = &["NK cells resting", "NK cells activated"];
const LM22_MONO_MACRO: &[&str] = &[
    "Monocytes",
    "Macrophages M0",
    "Macrophages M1",
    "Macrophages M2",
];
const LM22_NEUTROPHIL: &[&str] = &["Neutrophils"];

const EPIC_B: &[&str] = &["Bcells"];
const EPIC_CD4: &[&str] = &["CD4_Tcells"];
const EPIC_CD8: &[&str] = &["CD8_Tcells"];
const EPIC_NK: &[&str] = &["NKcells"];
const EPIC_MONO_MACRO: &[&str] = &["Monocytes", "Macrophages"];
const EPIC_NEUTROPHIL: &[&str] = &["Neutrophils"];

const QUANTISEQ_B: &[&str] = &["B.cells"];
const QUANTISEQ_CD4: &[&str] = &["T.cells.CD4", "Tregs"];
const QUANTISEQ_CD8: &[&str] = &["T.cells.CD8"];
const QUANTISEQ_NK: &[&str] = &["NK.cells"];
const QUANTISEQ_MONO_MACRO: &[&str] = &["Monocytes", "Macrophages.M1", "Macrophages.M2"];
const QUANTISEQ_NEUTROPHIL: &[&str] = &["Neutrophils"];

const BUILTIN_TABLES: &[LabelTableDef] = &[
    LabelTableDef {
        estimator: EstimatorId::Lm22,
        categories: &[
            CategoryLabels {
                category: Category::B,
                labels: LM22_B,
            },
            CategoryLabels {
                category: Category::Cd4,
                labels: LM22_CD4,
            },
            CategoryLabels {
                category: Category::Cd8,
                labels: LM22_CD8,
            },
            CategoryLabels {
                category: Category::Nk,
                labels: LM22_NK,
            },
            CategoryLabels {
                category: Category::MonoMacro,
                labels: LM22_MONO_MACRO,
            },
            CategoryLabels {
                category: Category::Neutrophil,
                labels: LM22_NEUTROPHIL,
            },
        ],
    },
    LabelTableDef {
        estimator: EstimatorId::Epic,
        categories: &[
            CategoryLabels {
                category: Category::B,
                labels: EPIC_B,
            },
            CategoryLabels {
                category: Category::Cd4,
                labels: EPIC_CD4,
            },
            CategoryLabels {
                category: Category::Cd8,
                labels: EPIC_CD8,
            },
            CategoryLabels {
                category: Category::Nk,
                labels: EPIC_NK,
            },
            CategoryLabels {
                category: Category::MonoMacro,
                labels: EPIC_MONO_MACRO,
            },
            CategoryLabels {
                category: Category::Neutrophil,
                labels: EPIC_NEUTROPHIL,
            },
        ],
    },
    LabelTableDef {
        estimator: EstimatorId::Quantiseq,
        categories: &[
            CategoryLabels {
                category: Category::B,
                labels: QUANTISEQ_B,
            },
            CategoryLabels {
                category: Category::Cd4,
                labels: QUANTISEQ_CD4,
            },
            CategoryLabels {
                category: Category::Cd8,
                labels: QUANTISEQ_CD8,
            },
            CategoryLabels {
                category: Category::Nk,
                labels: QUANTISEQ_NK,
            },
            CategoryLabels {
                category: Category::MonoMacro,
                labels: QUANTISEQ_MONO_MACRO,
            },
            CategoryLabels {
                category: Category::Neutrophil,
                labels: QUANTISEQ_NEUTROPHIL,
            },
        ],
    },
];

pub fn builtin_label_tables() -> &'static [LabelTableDef] {
    BUILTIN_TABLES
}

/// Per-category divisors converting mRNA fractions into cell fractions.
///
/// Values are relative mRNA content per cell; the default set is the
/// published per-cell-type table used by EPIC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenormDivisors {
    pub b: f64,
    pub cd4: f64,
    pub cd8: f64,
    pub nk: f64,
    pub mono_macro: f64,
    pub neutrophil: f64,
}

impl RenormDivisors {
    pub const MRNA_CONTENT: RenormDivisors = RenormDivisors {
        b: 0.4016,
        cd4: 0.3952,
        cd8: 0.3952,
        nk: 0.4396,
        mono_macro: 1.4196,
        neutrophil: 0.1300,
    };

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::B => self.b,
            Category::Cd4 => self.cd4,
            Category::Cd8 => self.cd8,
            Category::Nk => self.nk,
            Category::MonoMacro => self.mono_macro,
            Category::Neutrophil => self.neutrophil,
        }
    }
}

impl Default for RenormDivisors {
    fn default() -> Self {
        Self::MRNA_CONTENT
    }
}
