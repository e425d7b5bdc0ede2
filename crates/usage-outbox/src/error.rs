//! Delivery error types.

use crate::client::AttemptFailure;
use thiserror::Error;

/// Failure below HTTP: no response was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

/// Outcome of a delivery that did not succeed.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The server refused the request; retrying cannot help.
    #[error("Rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Every attempt failed with a retryable outcome.
    #[error("Gave up after {retries} retries: {last}")]
    RetriesExhausted { retries: u32, last: AttemptFailure },

    /// The request body could not be encoded.
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Dead-letter notification failure.
///
/// Webhook URLs carry their credential in the path, so request errors are
/// stored without the URL.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url().to_string())
    }
}

/// Sender error type.
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Spool error: {0}")]
    Spool(#[from] usage_spool::SpoolError),
}

/// Result type alias using SenderError.
pub type SenderResult<T> = Result<T, SenderError>;
