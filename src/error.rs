//! Error types for Summary File extraction.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving, loading, or joining Summary File tables.
///
/// Structural variants (`TableNotFound`, `MissingFile`, `ColumnRange`,
/// `DuplicateKey`, `InvalidMetadata`) abort the current request;
/// `MalformedRow` is only raised when the run is configured to abort on bad
/// rows, otherwise such rows are skipped and counted.
#[derive(Debug, Error)]
pub enum AcsError {
    /// The requested table id has no row in the appendix directory.
    #[error("table {table_id} not found in the appendix directory")]
    TableNotFound { table_id: String },

    /// An expected input file or archive entry is absent.
    #[error("missing file: {}{}", .path.display(), .hint.as_deref().map(|h| format!(" ({h})")).unwrap_or_default())]
    MissingFile {
        path: PathBuf,
        hint: Option<String>,
    },

    /// A row cannot be used: wrong column count, empty record key, or a
    /// missing estimate/margin partner row.
    #[error("{file}: record {record}: {reason}")]
    MalformedRow {
        file: String,
        record: u64,
        reason: String,
    },

    /// The appendix column range does not fit the sequence template,
    /// which indicates an appendix/data version mismatch.
    #[error(
        "columns {start}-{end} out of bounds for sequence {sequence} ({available} columns in template)"
    )]
    ColumnRange {
        sequence: String,
        start: usize,
        end: usize,
        available: usize,
    },

    /// A logical record number appeared more than once on one side of the join.
    #[error("duplicate logical record number {logrecno} in {side} rows")]
    DuplicateKey {
        logrecno: String,
        side: &'static str,
    },

    /// A directory or template file is structurally unusable (bad header,
    /// missing required column, too few rows).
    #[error("{file}: {reason}")]
    InvalidMetadata { file: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

impl AcsError {
    pub fn missing_file(path: impl Into<PathBuf>) -> Self {
        AcsError::MissingFile {
            path: path.into(),
            hint: None,
        }
    }

    pub fn missing_file_hint(path: impl Into<PathBuf>, hint: impl Into<String>) -> Self {
        AcsError::MissingFile {
            path: path.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn malformed_row(
        file: impl Into<String>,
        record: u64,
        reason: impl Into<String>,
    ) -> Self {
        AcsError::MalformedRow {
            file: file.into(),
            record,
            reason: reason.into(),
        }
    }

    pub fn invalid_metadata(file: impl Into<String>, reason: impl Into<String>) -> Self {
        AcsError::InvalidMetadata {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for Summary File operations.
pub type Result<T> = std::result::Result<T, AcsError>;
