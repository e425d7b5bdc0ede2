//! Best-effort alerts for dead-lettered batches.

use crate::NotifyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};

/// Timeout for webhook delivery.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// What an operator needs to act on a dead-lettered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterNotice {
    pub title: String,
    pub file_path: PathBuf,
    pub batch_key: String,
    pub last_error: String,
    pub first_attempt_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl DeadLetterNotice {
    /// Plain-text rendering used by every notifier.
    pub fn message(&self) -> String {
        format!(
            "{}\nFile: {}\nBatch: {}\nFirst attempt: {}\nRetries: {}\nLast error: {}",
            self.title,
            self.file_path.display(),
            self.batch_key,
            self.first_attempt_at.to_rfc3339(),
            self.retry_count,
            self.last_error
        )
    }
}

/// Delivers dead-letter alerts. Failures are reported, never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_error_notification(&self, notice: &DeadLetterNotice) -> Result<(), NotifyError>;
}

/// Writes the notice to the log. Used when no webhook is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_error_notification(&self, notice: &DeadLetterNotice) -> Result<(), NotifyError> {
        error!(
            title = %notice.title,
            file = %notice.file_path.display(),
            batch_key = %notice.batch_key,
            retry_count = notice.retry_count,
            first_attempt_at = %notice.first_attempt_at.to_rfc3339(),
            last_error = %notice.last_error,
            "Batch moved to dead-letter"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload {
    text: String,
}

/// Posts a Slack-compatible `{"text": ...}` message to a webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("webhook", &webhook_origin(&self.webhook_url))
            .finish()
    }
}

/// Scheme and host of a webhook URL; the path is the credential.
pub(crate) fn webhook_origin(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.origin().ascii_serialization(),
        Err(_) => "<invalid url>".to_string(),
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_error_notification(&self, notice: &DeadLetterNotice) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            text: notice.message(),
        };
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(batch_key = %notice.batch_key, "Dead-letter notification sent");
        Ok(())
    }
}
