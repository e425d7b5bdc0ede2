//! Reliable delivery of usage batches to the metering API.
//!
//! This crate provides:
//! - Retry classification of HTTP outcomes
//! - A delivery client with exponential backoff and `Retry-After` support
//! - The [`Sender`], which spools batches that exhaust their retries and
//!   later redelivers or dead-letters them
//! - Best-effort dead-letter notifications
//!
//! # Architecture
//!
//! ```text
//! RecordBatch -> Sender::send -> DeliveryClient::post -> HttpTransport
//!                     |                   (retry loop)
//!                     v  retries exhausted
//!                SpoolStore::save
//!
//! Sender::resend_spooled -> SpoolStore::list -> post -> delete
//!                                              \-> update | dead-letter + notify
//! ```

mod client;
mod error;
mod metrics;
mod notifier;
mod policy;
mod sender;
mod transport;

#[cfg(test)]
mod tests;

pub use client::{AttemptFailure, DeliveryClient, DeliveryClientConfig, MAX_ERROR_BODY_CHARS};
pub use error::{DeliveryError, NotifyError, SenderError, SenderResult, TransportError};
pub use metrics::{DeliveryCounters, RunReport};
pub use notifier::{DeadLetterNotice, LogNotifier, Notifier, WebhookNotifier};
pub use policy::{classify_status, classify_transport, ResponseClass};
pub use sender::{ResendSummary, SendOutcome, Sender, SenderConfig, UsagePayload};
pub use transport::{parse_retry_after, HttpResponse, HttpTransport, ReqwestTransport};
