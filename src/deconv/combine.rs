use std::collections::{BTreeMap, HashSet};

use crate::deconv::estimator::Estimator;
use crate::deconv::remap::{
    average_remapped, category_ids, remap_result, renormalize, samples_without_mass,
};
use crate::deconv::{CombineOptions, DeconvBundle, DeconvError, MixtureInput, OutputPaths};
use crate::input::{LabeledMatrix, load_mixture};
use crate::markers::mapping::{MarkerAudit, audit_markers, build_symbol_set};
use crate::markers::{Category, DESIGNATED_BASE, EstimatorId, LabelTableError, RESERVED_CATEGORY};
use crate::report::write_deconv_tables;

/// Mixture after validation, with negatives clamped and samples aligned.
#[derive(Debug)]
enum PreparedMixture {
    Shared(LabeledMatrix),
    PerEstimator {
        samples: Vec<String>,
        matrices: BTreeMap<EstimatorId, LabeledMatrix>,
    },
}

impl PreparedMixture {
    fn from_input(input: MixtureInput) -> Result<Self, DeconvError> {
        match input {
            MixtureInput::Single(mut matrix) => {
                validate_mixture(&mut matrix, "mixture")?;
                Ok(PreparedMixture::Shared(matrix))
            }
            MixtureInput::File(path) => {
                let mut matrix = load_mixture(&path)?;
                validate_mixture(&mut matrix, "mixture")?;
                Ok(PreparedMixture::Shared(matrix))
            }
            MixtureInput::PerEstimator(inputs) => {
                let mut samples: Option<Vec<String>> = None;
                let mut matrices = BTreeMap::new();
                for (id, mut matrix) in inputs {
                    validate_mixture(&mut matrix, id.name())?;
                    let matrix = match &samples {
                        None => {
                            samples = Some(matrix.col_ids().to_vec());
                            matrix
                        }
                        Some(order) => align_columns(&matrix, order).ok_or_else(|| {
                            DeconvError::InvalidInput(format!(
                                "{id} mixture samples differ from the other mixtures"
                            ))
                        })?,
                    };
                    matrices.insert(id, matrix);
                }
                match samples {
                    Some(samples) => Ok(PreparedMixture::PerEstimator { samples, matrices }),
                    None => Err(DeconvError::InvalidInput(
                        "per-estimator mixture list is empty".to_string(),
                    )),
                }
            }
        }
    }

    fn samples(&self) -> &[String] {
        match self {
            PreparedMixture::Shared(m) => m.col_ids(),
            PreparedMixture::PerEstimator { samples, .. } => samples,
        }
    }

    fn matrix_for(&self, id: EstimatorId) -> Option<&LabeledMatrix> {
        match self {
            PreparedMixture::Shared(m) => Some(m),
            PreparedMixture::PerEstimator { matrices, .. } => matrices.get(&id),
        }
    }
}

fn validate_mixture(matrix: &mut LabeledMatrix, label: &str) -> Result<(), DeconvError> {
    if matrix.is_empty() {
        return Err(DeconvError::InvalidInput(format!(
            "{label} has no genes or no samples"
        )));
    }
    if matrix.has_non_finite() {
        return Err(DeconvError::InvalidInput(format!(
            "{label} contains missing or non-finite values"
        )));
    }
    let clamped = matrix.clamp_negative();
    if clamped > 0 {
        tracing::warn!("{}: clamped {} negative values to zero", label, clamped);
    }
    Ok(())
}

fn align_columns(matrix: &LabeledMatrix, order: &[String]) -> Option<LabeledMatrix> {
    if matrix.n_cols() != order.len() {
        return None;
    }
    let index = matrix.col_index();
    let cols = order
        .iter()
        .map(|id| index.get(id.as_str()).copied())
        .collect::<Option<Vec<_>>>()?;
    Some(matrix.select_cols(&cols))
}

/// Reorders a samples x labels result to the mixture's sample order.
fn align_result(result: LabeledMatrix, samples: &[String]) -> Result<LabeledMatrix, String> {
    if result.n_rows() != samples.len() {
        return Err(format!(
            "result has {} samples, mixture has {}",
            result.n_rows(),
            samples.len()
        ));
    }
    if result.has_non_finite() {
        return Err("result contains non-finite proportions".to_string());
    }
    if result.row_ids() == samples {
        return Ok(result);
    }
    result.reorder_rows(samples).map_err(|e| e.to_string())
}

fn index_estimators<'a>(
    estimators: &[&'a dyn Estimator],
) -> Result<BTreeMap<EstimatorId, &'a dyn Estimator>, DeconvError> {
    let mut by_id = BTreeMap::new();
    for &est in estimators {
        if by_id.insert(est.id(), est).is_some() {
            return Err(DeconvError::InvalidInput(format!(
                "estimator {} supplied more than once",
                est.id()
            )));
        }
    }
    Ok(by_id)
}

/// Runs every supplied estimator on the mixture and averages the usable ones
/// into the shared category taxonomy.
///
/// When `output` is given, `prop` and `cellProp` are written only after the
/// whole combination succeeded.
pub fn run_combiner(
    mixture: MixtureInput,
    estimators: &[&dyn Estimator],
    options: &CombineOptions,
    output: Option<&OutputPaths>,
) -> Result<DeconvBundle, DeconvError> {
    let mixture = PreparedMixture::from_input(mixture)?;
    let by_id = index_estimators(estimators)?;
    let samples = mixture.samples().to_vec();

    let mut marker_audits = Vec::with_capacity(EstimatorId::ALL.len());
    for id in EstimatorId::ALL {
        let min_required = options.min_markers.get(id);
        let audit = match by_id.get(&id) {
            Some(est) => {
                let genes: Option<HashSet<String>> =
                    mixture.matrix_for(id).map(|m| build_symbol_set(m.row_ids()));
                audit_markers(id, genes.as_ref(), est.markers(), min_required)
            }
            None => MarkerAudit {
                estimator: id,
                marker_set_size: 0,
                overlap: 0,
                min_required,
                marker_usable: false,
            },
        };
        tracing::info!(
            "{}: marker overlap {}/{} (min {})",
            id,
            audit.overlap,
            audit.marker_set_size,
            audit.min_required
        );
        marker_audits.push(audit);
    }

    let estimate_options = options.estimate_options();
    let mut raw_res: BTreeMap<EstimatorId, Option<LabeledMatrix>> = BTreeMap::new();
    for (&id, est) in &by_id {
        let Some(matrix) = mixture.matrix_for(id) else {
            tracing::warn!("{}: no mixture supplied; skipping", id);
            raw_res.insert(id, None);
            continue;
        };
        let result = match est.estimate(matrix, &estimate_options) {
            Ok(result) => match align_result(result, &samples) {
                Ok(aligned) => Some(aligned),
                Err(reason) => {
                    tracing::warn!("{}: unusable result: {}", id, reason);
                    None
                }
            },
            Err(err) => {
                tracing::warn!("{}: estimation failed: {}", id, err);
                None
            }
        };
        raw_res.insert(id, result);
    }

    let mut used_comb = BTreeMap::new();
    for audit in &marker_audits {
        let produced = raw_res
            .get(&audit.estimator)
            .is_some_and(|r| r.is_some());
        used_comb.insert(audit.estimator, audit.marker_usable && produced);
    }
    if !used_comb.values().any(|&used| used) {
        for audit in &marker_audits {
            let state = match raw_res.get(&audit.estimator) {
                None => "not supplied",
                Some(None) => "failed",
                Some(Some(_)) => "ok",
            };
            tracing::error!(
                "{}: marker overlap {} (min {}), estimation {}",
                audit.estimator,
                audit.overlap,
                audit.min_required,
                state
            );
        }
        return Err(DeconvError::NoQualifiedCombination(marker_audits));
    }

    let categories: &[Category] = if options.protein {
        &Category::ALL
    } else {
        &Category::WITHOUT_RESERVED
    };
    let mut merged_prop = BTreeMap::new();
    for (&id, result) in &raw_res {
        if let Some(result) = result {
            let table = options
                .label_tables
                .get(id)
                .ok_or(LabelTableError::Missing(id))?;
            merged_prop.insert(id, remap_result(result, table, categories)?);
        }
    }

    let usable: Vec<&LabeledMatrix> = merged_prop
        .iter()
        .filter(|(id, _)| used_comb.get(*id).copied().unwrap_or(false))
        .map(|(_, m)| m)
        .collect();
    let mean = average_remapped(&samples, categories, &usable)?;
    let empty = samples_without_mass(&mean);
    if !empty.is_empty() {
        tracing::warn!(
            "{} samples have no mass in any category: {}",
            empty.len(),
            empty.join(", ")
        );
    }

    let (prop, cell_prop) = if options.protein {
        (mean, None)
    } else {
        let reserved = reserved_fraction(&raw_res, &used_comb, options, &samples)?;
        let prop = rescale_around_reserved(&mean, &reserved, &samples)?;
        let cell_prop = renormalize(&prop, &Category::ALL, &options.divisors);
        (prop, Some(cell_prop))
    };

    let bundle = DeconvBundle {
        prop,
        cell_prop,
        merged_prop,
        raw_res,
        used_comb,
        marker_audits,
    };

    if let Some(paths) = output {
        write_deconv_tables(&bundle, paths)?;
    }
    Ok(bundle)
}

/// Reserved-category fraction per sample from the designated estimator,
/// zero when that estimator is not usable.
fn reserved_fraction(
    raw_res: &BTreeMap<EstimatorId, Option<LabeledMatrix>>,
    used_comb: &BTreeMap<EstimatorId, bool>,
    options: &CombineOptions,
    samples: &[String],
) -> Result<Vec<f64>, DeconvError> {
    let used = used_comb.get(&DESIGNATED_BASE).copied().unwrap_or(false);
    let base = raw_res.get(&DESIGNATED_BASE).and_then(|r| r.as_ref());
    match base {
        Some(result) if used => {
            let table = options
                .label_tables
                .get(DESIGNATED_BASE)
                .ok_or(LabelTableError::Missing(DESIGNATED_BASE))?;
            let full = remap_result(result, table, &Category::ALL)?;
            let col = Category::ALL
                .iter()
                .position(|&c| c == RESERVED_CATEGORY)
                .unwrap_or(Category::ALL.len() - 1);
            Ok(full.col(col))
        }
        _ => {
            tracing::warn!(
                "{} is not usable; {} fraction set to zero",
                DESIGNATED_BASE,
                RESERVED_CATEGORY
            );
            Ok(vec![0.0; samples.len()])
        }
    }
}

/// Keeps the reserved fraction `r` and scales the other categories of `mean`
/// to fill the remaining `1 - r`.
fn rescale_around_reserved(
    mean: &LabeledMatrix,
    reserved: &[f64],
    samples: &[String],
) -> Result<LabeledMatrix, DeconvError> {
    let mut prop = LabeledMatrix::zeros(samples.to_vec(), category_ids(&Category::ALL))?;
    for (row, &r) in reserved.iter().enumerate() {
        for (col, &cat) in Category::ALL.iter().enumerate() {
            let value = if cat == RESERVED_CATEGORY {
                r
            } else {
                let src = Category::WITHOUT_RESERVED
                    .iter()
                    .position(|&c| c == cat)
                    .map_or(0.0, |i| mean.get(row, i));
                (1.0 - r) * src
            };
            prop.set(row, col, value);
        }
    }
    Ok(prop)
}

#[cfg(test)]
#[path = "../../tests/src_inline/deconv/combine.rs"]
mod tests;
