use crate::input::LabeledMatrix;
use crate::stats::{StatsError, check_fraction, quantile_type7, sorted_finite};

/// Clamps each row to its own `[q(lower), q(upper)]` range. NaN stays NaN.
///
/// Returns the capped matrix and the number of values changed.
pub fn cap_outliers(
    matrix: &LabeledMatrix,
    lower: f64,
    upper: f64,
) -> Result<(LabeledMatrix, usize), StatsError> {
    check_fraction("lower quantile", lower)?;
    check_fraction("upper quantile", upper)?;
    if lower >= upper {
        return Err(StatsError::InvalidParameter(format!(
            "lower quantile {lower} must be below upper quantile {upper}"
        )));
    }

    let mut out = matrix.clone();
    let mut capped = 0usize;
    for row in 0..out.n_rows() {
        let sorted = sorted_finite(out.row(row));
        if sorted.is_empty() {
            continue;
        }
        let lo = quantile_type7(&sorted, lower);
        let hi = quantile_type7(&sorted, upper);
        for v in out.row_mut(row).iter_mut() {
            if v.is_nan() {
                continue;
            }
            if *v < lo {
                *v = lo;
                capped += 1;
            } else if *v > hi {
                *v = hi;
                capped += 1;
            }
        }
    }
    tracing::info!(
        "capped {} values outside row quantiles [{}, {}]",
        capped,
        lower,
        upper
    );
    Ok((out, capped))
}
