//! Record validation errors.

use thiserror::Error;

/// Errors raised when building or validating records and batches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A batch must contain at least one record.
    #[error("batch has no records")]
    EmptyBatch,

    /// The stored batch key does not match the records it claims to cover.
    #[error("batch key mismatch: stored {stored}, computed {computed}")]
    BatchKeyMismatch { stored: String, computed: String },

    /// A record is missing its idempotency key.
    #[error("record at index {0} has an empty idempotency key")]
    MissingRecordKey(usize),
}

/// Result type alias using RecordError.
pub type RecordResult<T> = Result<T, RecordError>;
