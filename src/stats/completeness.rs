use serde::Serialize;

use crate::input::LabeledMatrix;
use crate::stats::{StatsError, check_fraction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletenessReport {
    pub rows_kept: usize,
    pub rows_dropped: usize,
    pub cols_kept: usize,
    pub cols_dropped: usize,
}

/// Drops rows, then columns, whose fraction of finite values is below the
/// given minimum. Column fractions are computed over the kept rows.
pub fn filter_complete(
    matrix: &LabeledMatrix,
    min_row_fraction: f64,
    min_col_fraction: f64,
) -> Result<(LabeledMatrix, CompletenessReport), StatsError> {
    check_fraction("min_row_fraction", min_row_fraction)?;
    check_fraction("min_col_fraction", min_col_fraction)?;

    let n_cols = matrix.n_cols();
    let rows: Vec<usize> = (0..matrix.n_rows())
        .filter(|&row| {
            let present = matrix.row(row).iter().filter(|v| v.is_finite()).count();
            n_cols > 0 && present as f64 / n_cols as f64 >= min_row_fraction
        })
        .collect();
    let by_row = matrix.select_rows(&rows);

    let n_rows = by_row.n_rows();
    let cols: Vec<usize> = (0..n_cols)
        .filter(|&col| {
            let present = (0..n_rows)
                .filter(|&row| by_row.get(row, col).is_finite())
                .count();
            n_rows > 0 && present as f64 / n_rows as f64 >= min_col_fraction
        })
        .collect();
    let filtered = by_row.select_cols(&cols);

    let report = CompletenessReport {
        rows_kept: filtered.n_rows(),
        rows_dropped: matrix.n_rows() - filtered.n_rows(),
        cols_kept: filtered.n_cols(),
        cols_dropped: n_cols - filtered.n_cols(),
    };
    tracing::info!(
        "completeness filter: kept {} rows ({} dropped), {} columns ({} dropped)",
        report.rows_kept,
        report.rows_dropped,
        report.cols_kept,
        report.cols_dropped
    );

    if filtered.is_empty() {
        return Err(StatsError::EmptyData(
            "no rows or columns pass the completeness thresholds".to_string(),
        ));
    }
    Ok((filtered, report))
}
