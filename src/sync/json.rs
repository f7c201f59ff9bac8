//! JSON array documents for snapshots.
//!
//! Each collection is one pretty-printed JSON array (2-space indent, trailing
//! newline). Output depends only on the input, so identical state produces
//! byte-identical files and git sees no change.

use miette::Diagnostic;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors that can occur reading or writing snapshot documents.
#[derive(Error, Diagnostic, Debug)]
pub enum JsonError {
    #[error("IO error: {0}")]
    #[diagnostic(code(routines::sync::json::io))]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    #[diagnostic(code(routines::sync::json::serialize))]
    Serialize(#[from] serde_json::Error),
}

/// Serialize `entities` as a JSON array document.
pub fn to_document<T: Serialize>(entities: &[T]) -> Result<String, JsonError> {
    let mut doc = serde_json::to_string_pretty(entities)?;
    doc.push('\n');
    Ok(doc)
}

/// Write entities to `path` atomically.
///
/// The document is written to a temporary file in the same directory and
/// renamed over the target, so readers see either the old or the new file.
pub fn write_json_array<T: Serialize>(path: &Path, entities: &[T]) -> Result<(), JsonError> {
    let doc = to_document(entities)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(doc.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| JsonError::Io(e.error))?;

    Ok(())
}

/// Read entities back from a JSON array document.
#[cfg(test)]
pub(crate) fn read_json_array<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Vec<T>, JsonError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
