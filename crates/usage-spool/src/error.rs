//! Spool error types.

use std::path::PathBuf;
use thiserror::Error;

/// Spool error type.
#[derive(Error, Debug)]
pub enum SpoolError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record failed schema validation
    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] usage_records::RecordError),

    /// No file exists for the given batch key or file name
    #[error("Not found: {0}")]
    NotFound(String),

    /// File name is not a dead-letter file name
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// Another process holds the spool lock
    #[error("Spool is locked by {holder} ({path})")]
    Locked { path: PathBuf, holder: String },
}

/// Result type alias using SpoolError.
pub type SpoolResult<T> = Result<T, SpoolError>;
