use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

pub mod json;

use crate::deconv::{DeconvBundle, DeconvError, OutputPaths};
use crate::input::table::render_table;
use crate::input::{InputError, LabeledMatrix};

pub const SAMPLE_ID_COLUMN: &str = "SampleID";

/// Writes `prop` and `cellProp` to their paths.
///
/// Both tables are staged next to their targets and only renamed into place
/// once every staged file is complete. If the second rename fails the first
/// target is removed again. In protein mode there is no `cellProp` and the
/// second path is left untouched.
pub fn write_deconv_tables(bundle: &DeconvBundle, paths: &OutputPaths) -> Result<(), DeconvError> {
    let prop = render_table(&bundle.prop, SAMPLE_ID_COLUMN)?;
    let cell_prop = bundle
        .cell_prop
        .as_ref()
        .map(|m| render_table(m, SAMPLE_ID_COLUMN))
        .transpose()?;

    let staged_prop = stage(&paths.prop, &prop)?;
    let staged_cell_prop = cell_prop
        .as_deref()
        .map(|bytes| stage(&paths.cell_prop, bytes))
        .transpose()?;

    staged_prop.persist(&paths.prop).map_err(|e| e.error)?;
    tracing::info!("wrote {}", paths.prop.display());
    match staged_cell_prop {
        Some(staged) => {
            if let Err(e) = staged.persist(&paths.cell_prop) {
                if let Err(cleanup) = fs::remove_file(&paths.prop) {
                    tracing::warn!("could not remove {}: {}", paths.prop.display(), cleanup);
                }
                return Err(e.error.into());
            }
            tracing::info!("wrote {}", paths.cell_prop.display());
        }
        None => tracing::warn!(
            "protein mode produces no cell proportions; {} not written",
            paths.cell_prop.display()
        ),
    }
    Ok(())
}

/// Writes `bytes` to a temporary file in the directory of `path`.
fn stage(path: &Path, bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

pub fn write_matrix(path: &Path, matrix: &LabeledMatrix, id_label: &str) -> Result<(), InputError> {
    let bytes = render_table(matrix, id_label)?;
    write_bytes(path, &bytes)?;
    tracing::info!(
        "wrote {} ({} x {})",
        path.display(),
        matrix.n_rows(),
        matrix.n_cols()
    );
    Ok(())
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, bytes)
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/mod.rs"]
mod tests;
