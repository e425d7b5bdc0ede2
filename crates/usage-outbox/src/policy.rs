//! Retry classification.
//!
//! Pure functions shared by the client's retry loop and the sender.

use crate::TransportError;

/// What a single attempt's outcome means for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx.
    Success,
    /// 409: the batch is already recorded downstream.
    Conflict,
    /// 5xx, 429, or no response at all.
    Retryable,
    /// Any other status. Retrying the same request cannot succeed.
    NonRetryable,
}

impl ResponseClass {
    /// Success and conflict both end delivery without error.
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Success | Self::Conflict)
    }
}

/// Classify an HTTP status code.
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        409 => ResponseClass::Conflict,
        429 | 500..=599 => ResponseClass::Retryable,
        _ => ResponseClass::NonRetryable,
    }
}

/// Classify a failure that produced no response.
///
/// Refused, reset, DNS and timeout failures are all transient.
pub fn classify_transport(_error: &TransportError) -> ResponseClass {
    ResponseClass::Retryable
}
