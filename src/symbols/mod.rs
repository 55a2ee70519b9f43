use std::fmt;
use std::io::Write;

use csv::WriterBuilder;
use serde::Serialize;

pub mod hgnc;

use crate::input::InputError;
use hgnc::NomenclatureTable;

#[derive(Debug, thiserror::Error)]
pub enum SymbolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("table error: {0}")]
    Csv(#[from] csv::Error),
    #[error("nomenclature table is missing column {0}")]
    MissingColumn(String),
    #[error("nomenclature table not available: {0}")]
    MissingTable(String),
    #[error(transparent)]
    Input(#[from] InputError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchStatus {
    #[serde(rename = "Approved symbol")]
    Approved,
    #[serde(rename = "Previous symbol")]
    Previous,
    #[serde(rename = "Alias symbols")]
    Alias,
    #[serde(rename = "not found")]
    NotFound,
}

impl MatchStatus {
    pub fn label(self) -> &'static str {
        match self {
            MatchStatus::Approved => "Approved symbol",
            MatchStatus::Previous => "Previous symbol",
            MatchStatus::Alias => "Alias symbols",
            MatchStatus::NotFound => "not found",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolMatch {
    pub input: String,
    pub standardized: Option<String>,
    pub status: MatchStatus,
}

/// Resolves each symbol against approved, then previous, then alias symbols.
///
/// Several previous-symbol hits are joined with `,`, several alias hits with
/// `;`. Input order and duplicates are preserved.
pub fn standardize_symbols(symbols: &[String], table: &NomenclatureTable) -> Vec<SymbolMatch> {
    let matches: Vec<SymbolMatch> = symbols
        .iter()
        .map(|symbol| standardize_one(symbol, table))
        .collect();
    let not_found = matches
        .iter()
        .filter(|m| m.status == MatchStatus::NotFound)
        .count();
    tracing::info!(
        "standardized {} symbols ({} not found)",
        matches.len(),
        not_found
    );
    matches
}

fn standardize_one(symbol: &str, table: &NomenclatureTable) -> SymbolMatch {
    let (standardized, status) = if let Some(approved) = table.approved(symbol) {
        (Some(approved.to_string()), MatchStatus::Approved)
    } else if let Some(hits) = table.by_previous(symbol) {
        (Some(hits.join(",")), MatchStatus::Previous)
    } else if let Some(hits) = table.by_alias(symbol) {
        (Some(hits.join(";")), MatchStatus::Alias)
    } else {
        (None, MatchStatus::NotFound)
    };
    SymbolMatch {
        input: symbol.to_string(),
        standardized,
        status,
    }
}

pub fn write_matches<W: Write>(matches: &[SymbolMatch], writer: W) -> Result<(), SymbolError> {
    let mut w = WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer);
    w.write_record(["symbol", "standardized", "status"])?;
    for m in matches {
        w.write_record([
            m.input.as_str(),
            m.standardized.as_deref().unwrap_or("NA"),
            m.status.label(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/symbols/tests.rs"]
mod tests;
