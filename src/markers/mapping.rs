use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::markers::EstimatorId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerAudit {
    pub estimator: EstimatorId,
    pub marker_set_size: usize,
    pub overlap: usize,
    pub min_required: usize,
    pub marker_usable: bool,
}

pub fn normalize_symbol(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let upper = trimmed.to_ascii_uppercase();
    if let Some((left, right)) = upper.rsplit_once('.') {
        if left.starts_with("ENS") && right.chars().all(|c| c.is_ascii_digit()) {
            return left.to_string();
        }
    }
    upper
}

pub fn build_symbol_set<'a, I>(symbols: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    symbols
        .into_iter()
        .map(|s| normalize_symbol(s))
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn marker_overlap(genes: &HashSet<String>, markers: &BTreeSet<String>) -> usize {
    build_symbol_set(markers)
        .iter()
        .filter(|m| genes.contains(*m))
        .count()
}

pub fn audit_markers(
    estimator: EstimatorId,
    genes: Option<&HashSet<String>>,
    markers: &BTreeSet<String>,
    min_required: usize,
) -> MarkerAudit {
    let overlap = genes.map_or(0, |g| marker_overlap(g, markers));
    MarkerAudit {
        estimator,
        marker_set_size: markers.len(),
        overlap,
        min_required,
        marker_usable: genes.is_some() && overlap >= min_required,
    }
}
