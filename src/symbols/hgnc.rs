use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use csv::ReaderBuilder;

use crate::input::gz::open_maybe_gz;
use crate::markers::mapping::normalize_symbol;
use crate::symbols::SymbolError;

const CACHE_PREFIX: &str = "hgnc_complete_set_";
const CACHE_SUFFIX: &str = ".txt";

const APPROVED_COLUMNS: &[&str] = &["Approved symbol", "symbol"];
const PREVIOUS_COLUMNS: &[&str] = &["Previous symbols", "prev_symbol"];
const ALIAS_COLUMNS: &[&str] = &["Alias symbols", "alias_symbol"];

/// Lookup tables built from an HGNC export, keyed by normalized symbol.
#[derive(Debug, Clone, Default)]
pub struct NomenclatureTable {
    approved: HashMap<String, String>,
    previous: HashMap<String, Vec<String>>,
    alias: HashMap<String, Vec<String>>,
}

impl NomenclatureTable {
    pub fn load(path: &Path) -> Result<Self, SymbolError> {
        let reader = open_maybe_gz(path)?;
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let find = |names: &[&str]| -> Result<usize, SymbolError> {
            headers
                .iter()
                .position(|h| names.contains(&h.trim()))
                .ok_or_else(|| SymbolError::MissingColumn(names[0].to_string()))
        };
        let approved_col = find(APPROVED_COLUMNS)?;
        let previous_col = find(PREVIOUS_COLUMNS)?;
        let alias_col = find(ALIAS_COLUMNS)?;

        let mut table = NomenclatureTable::default();
        for rec in rdr.records() {
            let rec = rec?;
            let approved = rec.get(approved_col).unwrap_or("").trim();
            if approved.is_empty() {
                continue;
            }
            table.insert(
                approved,
                &split_multi(rec.get(previous_col).unwrap_or("")),
                &split_multi(rec.get(alias_col).unwrap_or("")),
            );
        }
        tracing::info!(
            "loaded nomenclature table {}: {} approved symbols",
            path.display(),
            table.len()
        );
        Ok(table)
    }

    pub fn insert(&mut self, approved: &str, previous: &[String], aliases: &[String]) {
        let approved = approved.trim().to_string();
        self.approved
            .entry(normalize_symbol(&approved))
            .or_insert_with(|| approved.clone());
        for prev in previous {
            push_unique(&mut self.previous, prev, &approved);
        }
        for alias in aliases {
            push_unique(&mut self.alias, alias, &approved);
        }
    }

    pub fn approved(&self, symbol: &str) -> Option<&str> {
        self.approved.get(&normalize_symbol(symbol)).map(|s| s.as_str())
    }

    pub fn by_previous(&self, symbol: &str) -> Option<&[String]> {
        self.previous.get(&normalize_symbol(symbol)).map(|v| v.as_slice())
    }

    pub fn by_alias(&self, symbol: &str) -> Option<&[String]> {
        self.alias.get(&normalize_symbol(symbol)).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.approved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approved.is_empty()
    }
}

fn push_unique(map: &mut HashMap<String, Vec<String>>, key: &str, approved: &str) {
    let key = normalize_symbol(key);
    if key.is_empty() {
        return;
    }
    let entry = map.entry(key).or_default();
    if !entry.iter().any(|a| a == approved) {
        entry.push(approved.to_string());
    }
}

/// Splits a multi-valued cell such as `"A1B, ABG"` or `A1B|ABG`.
pub fn split_multi(field: &str) -> Vec<String> {
    field
        .split([',', '|'])
        .map(|s| s.trim().trim_matches('"').trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub fn cache_file_name(now: DateTime<Utc>) -> String {
    format!("{CACHE_PREFIX}{}{CACHE_SUFFIX}", now.format("%Y-%m"))
}

/// Picks the nomenclature table to use.
///
/// An explicit path wins. Otherwise the cache directory is searched for this
/// month's file, then for the most recent older month. Names whose month
/// does not parse, or that lie after `now`, are ignored.
pub fn resolve_table_path(
    explicit: Option<&Path>,
    cache_dir: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<PathBuf, SymbolError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(SymbolError::MissingTable(format!(
            "{} does not exist",
            path.display()
        )));
    }
    let Some(dir) = cache_dir else {
        return Err(SymbolError::MissingTable(
            "neither a table path nor a cache directory was given".to_string(),
        ));
    };

    let current = dir.join(cache_file_name(now));
    if current.exists() {
        return Ok(current);
    }

    let this_month = NaiveDate::from_ymd_opt(now.year(), now.month(), 1);
    let mut cached = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(month) = name
            .strip_prefix(CACHE_PREFIX)
            .and_then(|rest| rest.strip_suffix(CACHE_SUFFIX))
        else {
            continue;
        };
        match cache_month(month) {
            Some(date) if Some(date) <= this_month => cached.push((date, entry.path())),
            Some(_) => tracing::debug!("ignoring future cache file {}", name),
            None => tracing::debug!("ignoring cache file without a month: {}", name),
        }
    }
    cached.sort();
    match cached.pop() {
        Some((month, path)) => {
            tracing::warn!(
                "no nomenclature table cached for {}; using {} from {}",
                now.format("%Y-%m"),
                path.display(),
                month.format("%Y-%m")
            );
            Ok(path)
        }
        None => Err(SymbolError::MissingTable(format!(
            "no {CACHE_PREFIX}<YYYY-MM>{CACHE_SUFFIX} file in {}",
            dir.display()
        ))),
    }
}

fn cache_month(month: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").ok()
}
