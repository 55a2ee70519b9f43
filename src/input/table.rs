use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::input::gz::open_maybe_gz;
use crate::input::{InputError, LabeledMatrix};

pub fn read_table(path: &Path) -> Result<LabeledMatrix, InputError> {
    let reader = open_maybe_gz(path)?;
    parse_table(reader).map_err(|e| match e {
        InputError::Parse(msg) => InputError::Parse(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Parses a tab-delimited table whose first column holds row identifiers.
///
/// The header either labels the identifier column (same width as the data
/// rows) or omits it (one cell shorter), as R's `write.table` does.
pub fn parse_table<R: Read>(reader: R) -> Result<LabeledMatrix, InputError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut records = rdr.records();
    let header = match records.next() {
        Some(rec) => rec?,
        None => return Err(InputError::Parse("table is empty".to_string())),
    };
    let header: Vec<String> = header.iter().map(|s| s.trim().to_string()).collect();

    let mut row_ids = Vec::new();
    let mut values = Vec::new();
    let mut col_ids: Option<Vec<String>> = None;

    for (idx, rec) in records.enumerate() {
        let rec = rec?;
        let line_no = idx + 2;
        if rec.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let width = rec.len();
        if width < 2 {
            return Err(InputError::Parse(format!(
                "line {line_no} has <2 columns"
            )));
        }
        if col_ids.is_none() {
            col_ids = Some(resolve_header(&header, width, line_no)?);
        }
        let n_cols = col_ids.as_ref().map_or(0, |cols| cols.len());
        if width != n_cols + 1 {
            return Err(InputError::Parse(format!(
                "line {line_no} has {width} columns, expected {}",
                n_cols + 1
            )));
        }
        row_ids.push(rec[0].trim().to_string());
        for (col, field) in rec.iter().skip(1).enumerate() {
            let value = parse_value(field).ok_or_else(|| {
                InputError::Parse(format!(
                    "line {line_no}, column {}: cannot parse {field:?} as a number",
                    col + 2
                ))
            })?;
            values.push(value);
        }
    }

    let col_ids = match col_ids {
        Some(cols) => cols,
        None => return Err(InputError::Parse("table has no data rows".to_string())),
    };
    LabeledMatrix::new(row_ids, col_ids, values)
}

fn resolve_header(
    header: &[String],
    width: usize,
    line_no: usize,
) -> Result<Vec<String>, InputError> {
    if header.len() == width {
        Ok(header[1..].to_vec())
    } else if header.len() + 1 == width {
        Ok(header.to_vec())
    } else {
        Err(InputError::Parse(format!(
            "header has {} columns but line {line_no} has {width}",
            header.len()
        )))
    }
}

pub fn parse_value(field: &str) -> Option<f64> {
    let field = field.trim();
    match field {
        "" | "NA" | "NaN" | "nan" | "NULL" => Some(f64::NAN),
        _ => field.parse::<f64>().ok(),
    }
}

pub fn format_f64_6(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else {
        format!("{:.6}", v)
    }
}

/// Writes `matrix` tab-delimited with `id_label` heading the identifier column.
pub fn write_table<W: Write>(
    matrix: &LabeledMatrix,
    id_label: &str,
    writer: W,
) -> Result<(), InputError> {
    let mut w = WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer);

    let mut header = Vec::with_capacity(matrix.n_cols() + 1);
    header.push(id_label.to_string());
    header.extend(matrix.col_ids().iter().cloned());
    w.write_record(&header)?;

    for (row, id) in matrix.row_ids().iter().enumerate() {
        let mut record = Vec::with_capacity(matrix.n_cols() + 1);
        record.push(id.clone());
        record.extend(matrix.row(row).iter().map(|&v| format_f64_6(v)));
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

pub fn render_table(matrix: &LabeledMatrix, id_label: &str) -> Result<Vec<u8>, InputError> {
    let mut buf = Vec::new();
    write_table(matrix, id_label, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/table.rs"]
mod tests;
