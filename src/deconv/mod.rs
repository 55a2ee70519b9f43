use std::collections::BTreeMap;
use std::path::PathBuf;

pub mod combine;
pub mod estimator;
pub mod remap;

use crate::input::{InputError, LabeledMatrix};
use crate::markers::mapping::MarkerAudit;
use crate::markers::{EstimatorId, LabelTableError, LabelTables, RenormDivisors};
use estimator::EstimateOptions;

#[derive(Debug, thiserror::Error)]
pub enum DeconvError {
    #[error("invalid mixture: {0}")]
    InvalidInput(String),
    #[error("expected exactly two output paths (prop, cellProp), got {0}")]
    OutputPaths(usize),
    #[error("no qualified combination of estimators (marker overlap: {})", format_audits(.0))]
    NoQualifiedCombination(Vec<MarkerAudit>),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    LabelTable(#[from] LabelTableError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_audits(audits: &[MarkerAudit]) -> String {
    audits
        .iter()
        .map(|a| format!("{}={}/{}", a.estimator, a.overlap, a.min_required))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Mixture given either once for all estimators or separately per estimator.
#[derive(Debug, Clone)]
pub enum MixtureInput {
    Single(LabeledMatrix),
    PerEstimator(BTreeMap<EstimatorId, LabeledMatrix>),
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinMarkers {
    pub lm22: usize,
    pub epic: usize,
    pub quantiseq: usize,
}

impl MinMarkers {
    pub fn get(&self, id: EstimatorId) -> usize {
        match id {
            EstimatorId::Lm22 => self.lm22,
            EstimatorId::Epic => self.epic,
            EstimatorId::Quantiseq => self.quantiseq,
        }
    }

    pub fn set(&mut self, id: EstimatorId, value: usize) {
        match id {
            EstimatorId::Lm22 => self.lm22 = value,
            EstimatorId::Epic => self.epic = value,
            EstimatorId::Quantiseq => self.quantiseq = value,
        }
    }
}

impl Default for MinMarkers {
    fn default() -> Self {
        Self {
            lm22: 200,
            epic: 50,
            quantiseq: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub prop: PathBuf,
    pub cell_prop: PathBuf,
}

impl OutputPaths {
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, DeconvError> {
        match paths {
            [prop, cell_prop] => Ok(Self {
                prop: prop.clone(),
                cell_prop: cell_prop.clone(),
            }),
            other => Err(DeconvError::OutputPaths(other.len())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CombineOptions {
    pub min_markers: MinMarkers,
    pub rnaseq: bool,
    pub protein: bool,
    pub divisors: RenormDivisors,
    pub label_tables: LabelTables,
}

impl CombineOptions {
    pub fn with_builtin_tables(rnaseq: bool, protein: bool) -> Result<Self, DeconvError> {
        Ok(Self {
            min_markers: MinMarkers::default(),
            rnaseq,
            protein,
            divisors: RenormDivisors::MRNA_CONTENT,
            label_tables: LabelTables::builtin()?,
        })
    }

    pub fn estimate_options(&self) -> EstimateOptions {
        EstimateOptions::for_mode(self.rnaseq)
    }
}

/// Everything produced by one combiner run.
#[derive(Debug, Clone)]
pub struct DeconvBundle {
    /// Samples x categories, averaged across usable estimators.
    pub prop: LabeledMatrix,
    /// `prop` rescaled by per-category mRNA content; absent in protein mode.
    pub cell_prop: Option<LabeledMatrix>,
    /// Remapped result of every estimator that produced one.
    pub merged_prop: BTreeMap<EstimatorId, LabeledMatrix>,
    /// Raw result per supplied estimator; `None` when it failed.
    pub raw_res: BTreeMap<EstimatorId, Option<LabeledMatrix>>,
    pub used_comb: BTreeMap<EstimatorId, bool>,
    pub marker_audits: Vec<MarkerAudit>,
}
