pub mod completeness;
pub mod correlation;
pub mod outliers;

use crate::input::InputError;

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("empty result: {0}")]
    EmptyData(String),
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Input(#[from] InputError),
}

/// Quantile of ascending `sorted` values with linear interpolation (R type 7).
pub fn quantile_type7(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    out
}

/// 1-based ranks with ties sharing their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut ranks = vec![0.0f64; n];
    let mut i = 0usize;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

pub fn check_fraction(name: &str, value: f64) -> Result<(), StatsError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(StatsError::InvalidParameter(format!(
            "{name} must be in [0, 1], got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/stats/tests.rs"]
mod tests;
