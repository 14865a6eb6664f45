//! Error types for the import pipeline

use rusqlite::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for import operations
pub type Result<T> = std::result::Result<T, ImportError>;

/// Errors that abort a single document import (or, when fatal, the run)
#[derive(Error, Debug)]
pub enum ImportError {
    /// The document's thread id has no record in the metadata feed
    #[error("No metadata feed record for thread {0}")]
    UnknownDocument(i64),

    /// The document has no primary content container and the run discards such records
    #[error("Malformed document for thread {0}: no main content container")]
    MalformedDocument(i64),

    /// Snapshot file name does not embed a thread id
    #[error("Cannot read thread id from file name {0:?}")]
    UnaddressableSnapshot(PathBuf),

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feed parse error in {path:?}: {source}")]
    Feed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ImportError {
    /// Store failures that no later document can recover from.
    pub fn is_fatal(&self) -> bool {
        match self {
            ImportError::Store(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::ReadOnly
                    | ErrorCode::DiskFull
                    | ErrorCode::SystemIoFailure
            ),
            _ => false,
        }
    }
}

/// Whether a store error is a natural-key or pair uniqueness violation.
/// Foreign key and NOT NULL failures share the primary code, so the
/// extended code decides.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
