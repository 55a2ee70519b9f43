use std::path::Path;

use serde::Serialize;

use crate::deconv::{CombineOptions, DeconvBundle, DeconvError};
use crate::markers::{Category, EstimatorId};
use crate::report::write_bytes;

#[derive(Debug, Clone, Serialize)]
pub struct EstimatorSummary {
    pub estimator: EstimatorId,
    pub used: bool,
    pub produced_result: bool,
    pub marker_set_size: usize,
    pub marker_overlap: usize,
    pub min_markers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeconvSummary {
    pub tool: &'static str,
    pub version: &'static str,
    pub rnaseq: bool,
    pub protein: bool,
    pub n_samples: usize,
    pub categories: Vec<Category>,
    pub estimators: Vec<EstimatorSummary>,
    pub has_cell_prop: bool,
}

pub fn build_summary(bundle: &DeconvBundle, options: &CombineOptions) -> DeconvSummary {
    let estimators = bundle
        .marker_audits
        .iter()
        .map(|audit| EstimatorSummary {
            estimator: audit.estimator,
            used: bundle
                .used_comb
                .get(&audit.estimator)
                .copied()
                .unwrap_or(false),
            produced_result: bundle
                .raw_res
                .get(&audit.estimator)
                .is_some_and(|r| r.is_some()),
            marker_set_size: audit.marker_set_size,
            marker_overlap: audit.overlap,
            min_markers: audit.min_required,
        })
        .collect();

    DeconvSummary {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        rnaseq: options.rnaseq,
        protein: options.protein,
        n_samples: bundle.prop.n_rows(),
        categories: Category::ALL.to_vec(),
        estimators,
        has_cell_prop: bundle.cell_prop.is_some(),
    }
}

pub fn render_summary_json(summary: &DeconvSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}

pub fn write_summary_json(path: &Path, summary: &DeconvSummary) -> Result<(), DeconvError> {
    let json = render_summary_json(summary)?;
    write_bytes(path, json.as_bytes())?;
    tracing::info!("wrote {}", path.display());
    Ok(())
}
