use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::input::LabeledMatrix;
use crate::stats::{StatsError, average_ranks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
}

#[derive(Debug, Clone)]
pub struct CorrelationResult {
    /// Coefficients, rows of `x` by rows of `y`.
    pub r: LabeledMatrix,
    /// Two-sided p-values, same layout as `r`.
    pub p: LabeledMatrix,
    pub n_samples: usize,
}

pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Correlates every row of `x` with every row of `y` over their shared columns.
///
/// Cells are computed independently on a dedicated pool and assembled once
/// all of them finished. Pairs with fewer than three complete observations
/// or zero variance give NaN.
pub fn correlate(
    x: &LabeledMatrix,
    y: &LabeledMatrix,
    method: CorrelationMethod,
    threads: Option<usize>,
) -> Result<CorrelationResult, StatsError> {
    let y_cols = y.col_index();
    let mut x_idx = Vec::new();
    let mut y_idx = Vec::new();
    for (col, id) in x.col_ids().iter().enumerate() {
        if let Some(&other) = y_cols.get(id.as_str()) {
            x_idx.push(col);
            y_idx.push(other);
        }
    }
    if x_idx.len() < 3 {
        return Err(StatsError::EmptyData(format!(
            "x and y share {} samples; at least 3 are required",
            x_idx.len()
        )));
    }
    let xs = x.select_cols(&x_idx);
    let ys = y.select_cols(&y_idx);

    let threads = threads.unwrap_or_else(default_threads).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()?;

    let nx = xs.n_rows();
    let ny = ys.n_rows();
    tracing::info!(
        "correlating {} x {} pairs over {} samples ({:?}, {} threads)",
        nx,
        ny,
        x_idx.len(),
        method,
        threads
    );
    let cells: Vec<(f64, f64)> = pool.install(|| {
        (0..nx * ny)
            .into_par_iter()
            .map(|cell| {
                let i = cell / ny;
                let j = cell % ny;
                pair_correlation(xs.row(i), ys.row(j), method)
            })
            .collect()
    });

    let (r_values, p_values): (Vec<f64>, Vec<f64>) = cells.into_iter().unzip();
    let r = LabeledMatrix::new(xs.row_ids().to_vec(), ys.row_ids().to_vec(), r_values)?;
    let p = LabeledMatrix::new(xs.row_ids().to_vec(), ys.row_ids().to_vec(), p_values)?;
    Ok(CorrelationResult {
        r,
        p,
        n_samples: x_idx.len(),
    })
}

/// Coefficient and two-sided p-value over pairwise-complete observations.
pub fn pair_correlation(a: &[f64], b: &[f64], method: CorrelationMethod) -> (f64, f64) {
    let (mut xa, mut xb): (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b)
        .filter(|(u, v)| u.is_finite() && v.is_finite())
        .map(|(u, v)| (*u, *v))
        .unzip();
    let n = xa.len();
    if n < 3 {
        return (f64::NAN, f64::NAN);
    }
    if method == CorrelationMethod::Spearman {
        xa = average_ranks(&xa);
        xb = average_ranks(&xb);
    }
    let r = pearson(&xa, &xb);
    (r, correlation_p_value(r, n))
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (u, v) in a.iter().zip(b) {
        let du = u - mean_a;
        let dv = v - mean_b;
        cov += du * dv;
        var_a += du * du;
        var_b += dv * dv;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return f64::NAN;
    }
    (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0)
}

fn correlation_p_value(r: f64, n: usize) -> f64 {
    if r.is_nan() {
        return f64::NAN;
    }
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return 0.0;
    }
    let t = r * (df / denom).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/stats/correlation.rs"]
mod tests;
