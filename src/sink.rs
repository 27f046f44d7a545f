//! Export file writer.
//!
//! The document is serialized into a sibling temp file and renamed over the
//! destination, so readers see either the previous export or the new one.

use crate::schemas::ExportDocument;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move {from} into place at {to}: {source}")]
    Persist {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Write `document` to `path` as 2-space-indented UTF-8 JSON.
pub fn write_export(path: &Path, document: &ExportDocument) -> Result<(), SinkError> {
    match persist(path, document) {
        Ok(()) => {
            info!(
                "Successfully wrote {} transactions to {}",
                document.metadata.total_transactions,
                path.display()
            );
            Ok(())
        }
        Err(e) => {
            error!("Error writing JSON file: {}", e);
            Err(e)
        }
    }
}

fn persist(path: &Path, document: &ExportDocument) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SinkError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp_path = temp_path_for(path);
    if let Err(e) = write_document(&tmp_path, document) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(SinkError::Persist {
            from: tmp_path,
            to: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn write_document(tmp_path: &Path, document: &ExportDocument) -> Result<(), SinkError> {
    let write_err = |source| SinkError::Write {
        path: tmp_path.to_path_buf(),
        source,
    };

    let file = File::create(tmp_path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.write_all(b"\n").map_err(write_err)?;
    let file = writer
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "export.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
