//! Delivery client with bounded retry.

use crate::policy::{classify_status, classify_transport, ResponseClass};
use crate::transport::{HttpResponse, HttpTransport};
use crate::{DeliveryError, TransportError};
use observability::redact::mask_authorization;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Response bodies kept in errors and logs are cut to this many characters.
pub const MAX_ERROR_BODY_CHARS: usize = 512;

/// Delivery client configuration.
#[derive(Debug, Clone)]
pub struct DeliveryClientConfig {
    /// Base URL of the metering API, without trailing path.
    pub base_url: String,
    pub api_token: String,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each one after.
    pub retry_base_delay: Duration,
    /// Upper bound on computed backoff. `Retry-After` is not capped.
    pub max_retry_delay: Duration,
}

impl Default for DeliveryClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: String::new(),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_millis(60_000),
        }
    }
}

/// Why a retryable attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Status { status: u16, body: String },
    Transport(TransportError),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } if body.is_empty() => write!(f, "HTTP {}", status),
            Self::Status { status, body } => write!(f, "HTTP {}: {}", status, body),
            Self::Transport(err) => write!(f, "{}", err),
        }
    }
}

/// Result of one attempt that did not deliver.
enum AttemptError {
    Fatal(DeliveryError),
    Retry {
        failure: AttemptFailure,
        retry_after: Option<Duration>,
    },
}

/// POSTs JSON to the metering API, retrying transient failures.
#[derive(Clone)]
pub struct DeliveryClient {
    config: DeliveryClientConfig,
    transport: Arc<dyn HttpTransport>,
}

impl DeliveryClient {
    pub fn new(config: DeliveryClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    /// POST `body` to `path`, retrying retryable failures with backoff.
    ///
    /// Resolves `Ok` for 2xx and 409. A non-retryable status fails at once
    /// with [`DeliveryError::Rejected`]; running out of retries fails with
    /// [`DeliveryError::RetriesExhausted`].
    pub async fn post<T>(&self, path: &str, body: &T) -> Result<HttpResponse, DeliveryError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let url = self.url(path);
        let body = serde_json::to_value(body)?;
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.attempt(&url, &body, attempt).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retry {
                    failure,
                    retry_after,
                }) => {
                    let retries_used = attempt - 1;
                    if retries_used >= max_retries {
                        error!(
                            url = %url,
                            attempt,
                            retries = retries_used,
                            error = %failure,
                            "Delivery failed, retries exhausted"
                        );
                        return Err(DeliveryError::RetriesExhausted {
                            retries: retries_used,
                            last: failure,
                        });
                    }

                    let delay = retry_after.unwrap_or_else(|| self.backoff(attempt));
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        server_requested = retry_after.is_some(),
                        error = %failure,
                        "Delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// POST exactly once, without retry.
    ///
    /// A retryable failure is reported as `RetriesExhausted` with zero retries.
    pub async fn post_once<T>(&self, path: &str, body: &T) -> Result<HttpResponse, DeliveryError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let url = self.url(path);
        let body = serde_json::to_value(body)?;

        match self.attempt(&url, &body, 1).await {
            Ok(response) => Ok(response),
            Err(AttemptError::Fatal(err)) => Err(err),
            Err(AttemptError::Retry { failure, .. }) => {
                warn!(url = %url, error = %failure, "Single delivery attempt failed");
                Err(DeliveryError::RetriesExhausted {
                    retries: 0,
                    last: failure,
                })
            }
        }
    }

    /// Computed delay before retry number `attempt`: base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.config
            .retry_base_delay
            .saturating_mul(factor)
            .min(self.config.max_retry_delay)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn attempt(
        &self,
        url: &str,
        body: &serde_json::Value,
        attempt: u32,
    ) -> Result<HttpResponse, AttemptError> {
        debug!(
            url = %url,
            attempt,
            auth = %mask_authorization(&format!("Bearer {}", self.config.api_token)),
            "Sending delivery request"
        );

        let result = self
            .transport
            .post_json(url, &self.config.api_token, body)
            .await;

        match result {
            Ok(response) => match classify_status(response.status) {
                ResponseClass::Success | ResponseClass::Conflict => {
                    debug!(url = %url, attempt, status = response.status, "Delivery accepted");
                    Ok(response)
                }
                ResponseClass::Retryable => Err(AttemptError::Retry {
                    failure: AttemptFailure::Status {
                        status: response.status,
                        body: truncate_body(&response.body),
                    },
                    retry_after: response.retry_after,
                }),
                ResponseClass::NonRetryable => {
                    let body = truncate_body(&response.body);
                    error!(
                        url = %url,
                        attempt,
                        status = response.status,
                        body = %body,
                        "Delivery rejected"
                    );
                    Err(AttemptError::Fatal(DeliveryError::Rejected {
                        status: response.status,
                        body,
                    }))
                }
            },
            Err(err) => match classify_transport(&err) {
                ResponseClass::Retryable => Err(AttemptError::Retry {
                    failure: AttemptFailure::Transport(err),
                    retry_after: None,
                }),
                _ => Err(AttemptError::Fatal(DeliveryError::RetriesExhausted {
                    retries: 0,
                    last: AttemptFailure::Transport(err),
                })),
            },
        }
    }
}

/// Cut a response body to [`MAX_ERROR_BODY_CHARS`] characters.
fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}
