use std::collections::HashMap;
use std::path::Path;

pub mod gz;
pub mod table;

use table::read_table;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("table error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Dense row-major table with unique row and column identifiers.
///
/// Expression matrices are genes x samples, proportion matrices are
/// samples x labels. Missing values are stored as `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledMatrix {
    row_ids: Vec<String>,
    col_ids: Vec<String>,
    values: Vec<f64>,
}

impl LabeledMatrix {
    pub fn new(
        row_ids: Vec<String>,
        col_ids: Vec<String>,
        values: Vec<f64>,
    ) -> Result<Self, InputError> {
        if values.len() != row_ids.len() * col_ids.len() {
            return Err(InputError::InvalidInput(format!(
                "matrix of {} x {} needs {} values, got {}",
                row_ids.len(),
                col_ids.len(),
                row_ids.len() * col_ids.len(),
                values.len()
            )));
        }
        ensure_unique("row", &row_ids)?;
        ensure_unique("column", &col_ids)?;
        Ok(Self {
            row_ids,
            col_ids,
            values,
        })
    }

    pub fn zeros(row_ids: Vec<String>, col_ids: Vec<String>) -> Result<Self, InputError> {
        let len = row_ids.len() * col_ids.len();
        Self::new(row_ids, col_ids, vec![0.0; len])
    }

    /// Builds a matrix from nested rows, mostly for fixtures and small tables.
    pub fn from_rows(
        row_ids: &[&str],
        col_ids: &[&str],
        rows: &[&[f64]],
    ) -> Result<Self, InputError> {
        if rows.len() != row_ids.len() {
            return Err(InputError::InvalidInput(format!(
                "{} row ids for {} rows",
                row_ids.len(),
                rows.len()
            )));
        }
        let mut values = Vec::with_capacity(row_ids.len() * col_ids.len());
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != col_ids.len() {
                return Err(InputError::InvalidInput(format!(
                    "row {} has {} values, expected {}",
                    row_ids[idx],
                    row.len(),
                    col_ids.len()
                )));
            }
            values.extend_from_slice(row);
        }
        Self::new(
            row_ids.iter().map(|s| s.to_string()).collect(),
            col_ids.iter().map(|s| s.to_string()).collect(),
            values,
        )
    }

    pub fn n_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn n_cols(&self) -> usize {
        self.col_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty() || self.col_ids.is_empty()
    }

    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    pub fn col_ids(&self) -> &[String] {
        &self.col_ids
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.col_ids.len() + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let n_cols = self.col_ids.len();
        self.values[row * n_cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let n_cols = self.col_ids.len();
        &self.values[row * n_cols..(row + 1) * n_cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let n_cols = self.col_ids.len();
        &mut self.values[row * n_cols..(row + 1) * n_cols]
    }

    pub fn col(&self, col: usize) -> Vec<f64> {
        (0..self.n_rows()).map(|row| self.get(row, col)).collect()
    }

    pub fn row_index(&self) -> HashMap<&str, usize> {
        index_of(&self.row_ids)
    }

    pub fn col_index(&self) -> HashMap<&str, usize> {
        index_of(&self.col_ids)
    }

    /// Sets negative entries to zero and returns how many were changed.
    pub fn clamp_negative(&mut self) -> usize {
        let mut clamped = 0usize;
        for v in self.values.iter_mut() {
            if *v < 0.0 {
                *v = 0.0;
                clamped += 1;
            }
        }
        clamped
    }

    pub fn has_non_finite(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }

    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut values = Vec::with_capacity(rows.len() * self.n_cols());
        for &row in rows {
            values.extend_from_slice(self.row(row));
        }
        Self {
            row_ids: rows.iter().map(|&r| self.row_ids[r].clone()).collect(),
            col_ids: self.col_ids.clone(),
            values,
        }
    }

    pub fn select_cols(&self, cols: &[usize]) -> Self {
        let mut values = Vec::with_capacity(self.n_rows() * cols.len());
        for row in 0..self.n_rows() {
            for &col in cols {
                values.push(self.get(row, col));
            }
        }
        Self {
            row_ids: self.row_ids.clone(),
            col_ids: cols.iter().map(|&c| self.col_ids[c].clone()).collect(),
            values,
        }
    }

    /// Reorders rows to follow `order`. Every id in `order` must be present.
    pub fn reorder_rows(&self, order: &[String]) -> Result<Self, InputError> {
        let index = self.row_index();
        let mut rows = Vec::with_capacity(order.len());
        for id in order {
            match index.get(id.as_str()) {
                Some(&row) => rows.push(row),
                None => {
                    return Err(InputError::InvalidInput(format!(
                        "row {id} not found in matrix"
                    )));
                }
            }
        }
        Ok(self.select_rows(&rows))
    }
}

fn ensure_unique(kind: &str, ids: &[String]) -> Result<(), InputError> {
    let mut seen = HashMap::with_capacity(ids.len());
    for (idx, id) in ids.iter().enumerate() {
        if let Some(first) = seen.insert(id.as_str(), idx) {
            return Err(InputError::InvalidInput(format!(
                "duplicate {kind} identifier {id} (positions {first} and {idx})"
            )));
        }
    }
    Ok(())
}

fn index_of(ids: &[String]) -> HashMap<&str, usize> {
    ids.iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect()
}

/// Reads a genes x samples expression table and clamps negatives to zero.
pub fn load_mixture(path: &Path) -> Result<LabeledMatrix, InputError> {
    if !path.exists() {
        return Err(InputError::MissingInput(format!(
            "mixture file {} does not exist",
            path.display()
        )));
    }
    let mut matrix = read_table(path)?;
    let clamped = matrix.clamp_negative();
    if clamped > 0 {
        tracing::warn!(
            "clamped {} negative values to zero in {}",
            clamped,
            path.display()
        );
    }
    tracing::info!(
        "loaded mixture {}: genes={}, samples={}",
        path.display(),
        matrix.n_rows(),
        matrix.n_cols()
    );
    Ok(matrix)
}

/// Reads a newline-separated identifier list (first tab-delimited field per line).
pub fn load_id_list(path: &Path) -> Result<Vec<String>, InputError> {
    use std::io::BufRead;

    let reader = gz::open_maybe_gz(path)?;
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let id = line.split('\t').next().unwrap_or("").trim();
        if id.is_empty() {
            continue;
        }
        ids.push(id.to_string());
    }
    if ids.is_empty() {
        return Err(InputError::Parse(format!(
            "identifier list {} is empty",
            path.display()
        )));
    }
    Ok(ids)
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
