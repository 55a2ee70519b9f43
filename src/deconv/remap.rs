use crate::input::{InputError, LabeledMatrix};
use crate::markers::{Category, LabelTable, RenormDivisors};

pub fn category_ids(categories: &[Category]) -> Vec<String> {
    categories.iter().map(|c| c.name().to_string()).collect()
}

/// Sums an estimator's label columns into `categories` and row-normalizes.
///
/// Labels outside `categories` are dropped. A sample with no mass in any
/// category stays all zero.
pub fn remap_result(
    result: &LabeledMatrix,
    table: &LabelTable,
    categories: &[Category],
) -> Result<LabeledMatrix, InputError> {
    let mut targets: Vec<Option<usize>> = Vec::with_capacity(result.n_cols());
    let mut unmapped = Vec::new();
    for label in result.col_ids() {
        let target = table
            .category_of(label)
            .and_then(|cat| categories.iter().position(|&c| c == cat));
        if target.is_none() {
            unmapped.push(label.as_str());
        }
        targets.push(target);
    }
    if !unmapped.is_empty() {
        tracing::debug!(
            "{}: labels outside the category set: {}",
            table.estimator,
            unmapped.join(", ")
        );
    }

    let mut out = LabeledMatrix::zeros(result.row_ids().to_vec(), category_ids(categories))?;
    for row in 0..result.n_rows() {
        let src = result.row(row);
        let dst = out.row_mut(row);
        for (col, target) in targets.iter().enumerate() {
            if let Some(t) = target {
                let v = src[col];
                if v.is_finite() {
                    dst[*t] += v;
                }
            }
        }
    }
    row_normalize(&mut out);
    Ok(out)
}

/// Scales every row to sum to one; rows without positive mass become zeros.
pub fn row_normalize(matrix: &mut LabeledMatrix) {
    for row in 0..matrix.n_rows() {
        let values = matrix.row_mut(row);
        let total: f64 = values.iter().sum();
        if total.is_finite() && total > 0.0 {
            for v in values.iter_mut() {
                *v /= total;
            }
        } else {
            values.fill(0.0);
        }
    }
}

/// Element-wise mean of remapped matrices sharing rows and columns.
///
/// For each sample only matrices with mass in that row contribute; an
/// all-zero row is missing data, not a zero estimate.
pub fn average_remapped(
    samples: &[String],
    categories: &[Category],
    matrices: &[&LabeledMatrix],
) -> Result<LabeledMatrix, InputError> {
    let mut out = LabeledMatrix::zeros(samples.to_vec(), category_ids(categories))?;
    for m in matrices {
        if m.row_ids() != samples || m.n_cols() != categories.len() {
            return Err(InputError::InvalidInput(
                "remapped matrices do not share samples and categories".to_string(),
            ));
        }
    }
    for row in 0..samples.len() {
        let mut n = 0usize;
        let dst = out.row_mut(row);
        for m in matrices {
            let src = m.row(row);
            if src.iter().sum::<f64>() <= 0.0 {
                continue;
            }
            for (d, s) in dst.iter_mut().zip(src) {
                *d += s;
            }
            n += 1;
        }
        if n > 0 {
            for d in dst.iter_mut() {
                *d /= n as f64;
            }
        }
    }
    Ok(out)
}

/// Row ids whose values carry no positive mass.
pub fn samples_without_mass(matrix: &LabeledMatrix) -> Vec<&str> {
    matrix
        .row_ids()
        .iter()
        .enumerate()
        .filter(|&(row, _)| matrix.row(row).iter().sum::<f64>() <= 0.0)
        .map(|(_, id)| id.as_str())
        .collect()
}

/// Divides each category column by its divisor and row-normalizes.
pub fn renormalize(
    prop: &LabeledMatrix,
    categories: &[Category],
    divisors: &RenormDivisors,
) -> LabeledMatrix {
    let mut out = prop.clone();
    for row in 0..out.n_rows() {
        for (col, &cat) in categories.iter().enumerate() {
            let d = divisors.get(cat);
            let v = out.get(row, col);
            out.set(row, col, if d > 0.0 { v / d } else { 0.0 });
        }
    }
    row_normalize(&mut out);
    out
}

#[cfg(test)]
#[path = "../../tests/src_inline/deconv/remap.rs"]
mod tests;
