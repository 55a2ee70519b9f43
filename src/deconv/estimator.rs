use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use crate::input::table::read_table;
use crate::input::{InputError, LabeledMatrix};
use crate::markers::EstimatorId;
use crate::markers::mapping::normalize_symbol;

#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    #[error("{estimator}: only {shared} signature genes present in the mixture (need {needed})")]
    TooFewGenes {
        estimator: EstimatorId,
        shared: usize,
        needed: usize,
    },
    #[error("{estimator}: sample {sample} has no signal over the signature genes")]
    ZeroSignal {
        estimator: EstimatorId,
        sample: String,
    },
    #[error("{estimator}: invalid signature: {reason}")]
    InvalidSignature {
        estimator: EstimatorId,
        reason: String,
    },
    #[error(transparent)]
    Input(#[from] InputError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateOptions {
    pub quantile_normalize: bool,
    pub max_sweeps: usize,
    pub tolerance: f64,
}

impl EstimateOptions {
    /// RNA-seq mixtures are not quantile normalized; arrays are.
    pub fn for_mode(rnaseq: bool) -> Self {
        Self {
            quantile_normalize: !rnaseq,
            ..Self::default()
        }
    }
}

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            quantile_normalize: true,
            max_sweeps: 1_000,
            tolerance: 1e-10,
        }
    }
}

/// A reference-based proportion estimator treated as a black box by the combiner.
///
/// `estimate` takes a genes x samples mixture and returns a samples x labels
/// matrix whose rows sum to one, using the estimator's own label vocabulary.
pub trait Estimator {
    fn id(&self) -> EstimatorId;
    fn markers(&self) -> &BTreeSet<String>;
    fn estimate(
        &self,
        mixture: &LabeledMatrix,
        options: &EstimateOptions,
    ) -> Result<LabeledMatrix, EstimatorError>;
}

/// Non-negative least squares against a genes x labels signature profile.
#[derive(Debug, Clone)]
pub struct SignatureEstimator {
    id: EstimatorId,
    signature: LabeledMatrix,
    markers: BTreeSet<String>,
}

impl SignatureEstimator {
    pub fn new(id: EstimatorId, signature: LabeledMatrix) -> Result<Self, EstimatorError> {
        if signature.is_empty() {
            return Err(EstimatorError::InvalidSignature {
                estimator: id,
                reason: "signature has no genes or no labels".to_string(),
            });
        }
        if signature.values().iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(EstimatorError::InvalidSignature {
                estimator: id,
                reason: "signature values must be finite and non-negative".to_string(),
            });
        }
        let markers = signature.row_ids().iter().cloned().collect();
        Ok(Self {
            id,
            signature,
            markers,
        })
    }

    pub fn load(id: EstimatorId, path: &Path) -> Result<Self, EstimatorError> {
        let signature = read_table(path)?;
        tracing::info!(
            "loaded {} signature {}: genes={}, labels={}",
            id,
            path.display(),
            signature.n_rows(),
            signature.n_cols()
        );
        Self::new(id, signature)
    }

    pub fn signature(&self) -> &LabeledMatrix {
        &self.signature
    }

    /// Narrows the signature to `genes` (normalized symbols), e.g. protein-coding genes.
    ///
    /// An estimator left without genes keeps its labels and an empty marker
    /// set, so it fails the marker threshold instead of aborting the run.
    pub fn restrict_to(&self, genes: &HashSet<String>) -> Self {
        let rows: Vec<usize> = self
            .signature
            .row_ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| genes.contains(&normalize_symbol(id)))
            .map(|(idx, _)| idx)
            .collect();
        if rows.is_empty() {
            tracing::warn!(
                "{} signature shares no genes with the protein-coding list",
                self.id
            );
        } else {
            tracing::debug!(
                "{} signature restricted from {} to {} genes",
                self.id,
                self.signature.n_rows(),
                rows.len()
            );
        }
        let signature = self.signature.select_rows(&rows);
        let markers = signature.row_ids().iter().cloned().collect();
        Self {
            id: self.id,
            signature,
            markers,
        }
    }
}

impl Estimator for SignatureEstimator {
    fn id(&self) -> EstimatorId {
        self.id
    }

    fn markers(&self) -> &BTreeSet<String> {
        &self.markers
    }

    fn estimate(
        &self,
        mixture: &LabeledMatrix,
        options: &EstimateOptions,
    ) -> Result<LabeledMatrix, EstimatorError> {
        let normalized;
        let mixture = if options.quantile_normalize {
            normalized = quantile_normalize(mixture);
            &normalized
        } else {
            mixture
        };

        let mut mix_rows: HashMap<String, usize> = HashMap::with_capacity(mixture.n_rows());
        for (idx, id) in mixture.row_ids().iter().enumerate() {
            mix_rows.entry(normalize_symbol(id)).or_insert(idx);
        }
        let shared: Vec<(usize, usize)> = self
            .signature
            .row_ids()
            .iter()
            .enumerate()
            .filter_map(|(sig_row, id)| {
                mix_rows
                    .get(&normalize_symbol(id))
                    .map(|&mix_row| (sig_row, mix_row))
            })
            .collect();

        let k = self.signature.n_cols();
        let needed = k.max(2);
        if shared.len() < needed {
            return Err(EstimatorError::TooFewGenes {
                estimator: self.id,
                shared: shared.len(),
                needed,
            });
        }

        let mut gram = vec![0.0f64; k * k];
        for &(sig_row, _) in &shared {
            let s = self.signature.row(sig_row);
            for a in 0..k {
                for b in a..k {
                    gram[a * k + b] += s[a] * s[b];
                }
            }
        }
        for a in 0..k {
            for b in 0..a {
                gram[a * k + b] = gram[b * k + a];
            }
        }

        let samples = mixture.col_ids().to_vec();
        let mut out = LabeledMatrix::zeros(samples.clone(), self.signature.col_ids().to_vec())?;
        for (col, sample) in samples.iter().enumerate() {
            let mut rhs = vec![0.0f64; k];
            for &(sig_row, mix_row) in &shared {
                let m = mixture.get(mix_row, col);
                let s = self.signature.row(sig_row);
                for a in 0..k {
                    rhs[a] += s[a] * m;
                }
            }
            let coef = nnls(&gram, &rhs, k, options.max_sweeps, options.tolerance);
            let total: f64 = coef.iter().sum();
            if total.is_nan() || total <= 0.0 {
                return Err(EstimatorError::ZeroSignal {
                    estimator: self.id,
                    sample: sample.clone(),
                });
            }
            for (label, c) in coef.iter().enumerate() {
                out.set(col, label, c / total);
            }
        }
        Ok(out)
    }
}

/// Minimizes `||Sx - m||^2` subject to `x >= 0` given `G = S'S` and `h = S'm`,
/// by cyclic projected coordinate descent.
pub fn nnls(gram: &[f64], rhs: &[f64], k: usize, max_sweeps: usize, tolerance: f64) -> Vec<f64> {
    let mut x = vec![0.0f64; k];
    for _ in 0..max_sweeps {
        let mut max_step = 0.0f64;
        for j in 0..k {
            let diag = gram[j * k + j];
            if diag <= 0.0 {
                x[j] = 0.0;
                continue;
            }
            let mut grad = -rhs[j];
            for i in 0..k {
                grad += gram[j * k + i] * x[i];
            }
            let next = (x[j] - grad / diag).max(0.0);
            let step = (next - x[j]).abs();
            if step > max_step {
                max_step = step;
            }
            x[j] = next;
        }
        let scale = x.iter().fold(0.0f64, |acc, v| acc.max(*v)).max(1.0);
        if max_step <= tolerance * scale {
            break;
        }
    }
    x
}

/// Quantile normalizes the columns of a genes x samples matrix.
pub fn quantile_normalize(matrix: &LabeledMatrix) -> LabeledMatrix {
    let n_rows = matrix.n_rows();
    let n_cols = matrix.n_cols();
    if n_rows == 0 || n_cols < 2 {
        return matrix.clone();
    }

    let mut orders = Vec::with_capacity(n_cols);
    let mut rank_means = vec![0.0f64; n_rows];
    for col in 0..n_cols {
        let values = matrix.col(col);
        let mut order: Vec<usize> = (0..n_rows).collect();
        order.sort_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for (rank, &row) in order.iter().enumerate() {
            rank_means[rank] += values[row];
        }
        orders.push(order);
    }
    for v in rank_means.iter_mut() {
        *v /= n_cols as f64;
    }

    let mut out = matrix.clone();
    for (col, order) in orders.iter().enumerate() {
        for (rank, &row) in order.iter().enumerate() {
            out.set(row, col, rank_means[rank]);
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/src_inline/deconv/estimator.rs"]
mod tests;
