//! Sender: immediate delivery, spooling, redelivery and dead-lettering.
//!
//! Per batch:
//!
//! ```text
//! send:   POST -> delivered | duplicate (409) | rejected (error)
//!              -> retries exhausted -> spooled (retry_count 0)
//! resend: spooled -> POST -> delivered (file deleted)
//!                         -> failed -> retry_count + 1
//!                              below ceiling -> spooled
//!                              at ceiling    -> dead-letter + notification
//! ```

use crate::client::DeliveryClient;
use crate::metrics::DeliveryCounters;
use crate::notifier::{DeadLetterNotice, Notifier};
use crate::transport::HttpResponse;
use crate::{DeliveryError, SenderResult};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use usage_records::{OutboundRecord, RecordBatch};
use usage_spool::{DeadLetterRecord, SpoolRecord, SpoolStore};

/// Title used for dead-letter notifications.
const DEAD_LETTER_TITLE: &str = "Usage batch moved to dead-letter";

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Path appended to the API base URL.
    pub usage_path: String,
    /// Failed resend cycles before a batch is dead-lettered.
    pub spool_max_retries: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            usage_path: "/usage".to_string(),
            spool_max_retries: 5,
        }
    }
}

/// Request body for the usage endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePayload<'a> {
    pub batch_idempotency_key: &'a str,
    pub records: &'a [OutboundRecord],
}

/// How a batch was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted downstream.
    Delivered,
    /// Downstream already had it (409).
    Duplicate,
    /// Retries ran out; the batch is durable in the spool.
    Spooled { path: PathBuf },
}

/// Totals for one `resend_spooled` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendSummary {
    pub attempted: usize,
    pub recovered: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    /// Spool operations that failed; the batch stays where it was.
    pub storage_errors: usize,
}

/// Orchestrates delivery of usage batches.
pub struct Sender {
    client: DeliveryClient,
    spool: Arc<dyn SpoolStore>,
    notifier: Arc<dyn Notifier>,
    config: SenderConfig,
}

impl Sender {
    pub fn new(
        client: DeliveryClient,
        spool: Arc<dyn SpoolStore>,
        notifier: Arc<dyn Notifier>,
        config: SenderConfig,
    ) -> Self {
        Self {
            client,
            spool,
            notifier,
            config,
        }
    }

    /// Deliver a batch now, spooling it if retries run out.
    ///
    /// A spooled batch is a success for the caller. A non-retryable
    /// rejection and a failed spool write are errors.
    pub async fn send(
        &self,
        batch: &RecordBatch,
        counters: &mut DeliveryCounters,
    ) -> SenderResult<SendOutcome> {
        let payload = UsagePayload {
            batch_idempotency_key: batch.batch_key(),
            records: batch.records(),
        };
        debug!(
            batch_key = %batch.batch_key(),
            records = batch.len(),
            "Sending batch"
        );

        match self.client.post(&self.config.usage_path, &payload).await {
            Ok(response) => {
                counters.records_sent += batch.len() as u64;
                Ok(delivered(&response, batch.batch_key(), batch.len()))
            }
            Err(err @ DeliveryError::RetriesExhausted { .. }) => {
                let record = SpoolRecord::new(batch, Utc::now(), err.to_string());
                let path = self.spool.save(&record)?;
                counters.batches_spooled += 1;
                warn!(
                    batch_key = %batch.batch_key(),
                    records = batch.len(),
                    path = %path.display(),
                    error = %err,
                    "Delivery deferred, batch spooled"
                );
                Ok(SendOutcome::Spooled { path })
            }
            Err(err) => {
                counters.records_failed += batch.len() as u64;
                error!(
                    batch_key = %batch.batch_key(),
                    records = batch.len(),
                    error = %err,
                    "Batch rejected"
                );
                Err(err.into())
            }
        }
    }

    /// Retry every spooled batch, oldest first, one at a time.
    ///
    /// Only a failure to list the spool aborts the pass. Storage failures on
    /// individual batches are logged and counted in the summary.
    pub async fn resend_spooled(
        &self,
        counters: &mut DeliveryCounters,
    ) -> SenderResult<ResendSummary> {
        let records = self.spool.list()?;
        let mut summary = ResendSummary::default();

        if records.is_empty() {
            debug!("Spool is empty");
            return Ok(summary);
        }
        info!(count = records.len(), "Resending spooled batches");

        for record in records {
            summary.attempted += 1;
            self.resend_one(record, counters, &mut summary).await;
        }

        info!(
            attempted = summary.attempted,
            recovered = summary.recovered,
            requeued = summary.requeued,
            dead_lettered = summary.dead_lettered,
            storage_errors = summary.storage_errors,
            "Resend pass complete"
        );
        Ok(summary)
    }

    /// One delivery attempt for an operator-selected dead-letter record.
    ///
    /// No retry, no spooling, no counters. The caller decides what to do
    /// with the dead-letter file.
    pub async fn resend_failed_file(
        &self,
        record: &DeadLetterRecord,
    ) -> Result<SendOutcome, DeliveryError> {
        let payload = UsagePayload {
            batch_idempotency_key: &record.batch_key,
            records: &record.records,
        };
        let response = self
            .client
            .post_once(&self.config.usage_path, &payload)
            .await?;
        Ok(delivered(&response, &record.batch_key, record.records.len()))
    }

    async fn resend_one(
        &self,
        mut record: SpoolRecord,
        counters: &mut DeliveryCounters,
        summary: &mut ResendSummary,
    ) {
        let record_count = record.records.len();
        let payload = UsagePayload {
            batch_idempotency_key: &record.batch_key,
            records: &record.records,
        };

        let err = match self.client.post(&self.config.usage_path, &payload).await {
            Ok(response) => {
                delivered(&response, &record.batch_key, record_count);
                counters.records_sent += record_count as u64;
                counters.batches_recovered += 1;
                summary.recovered += 1;
                if let Err(e) = self.spool.delete(&record.batch_key) {
                    summary.storage_errors += 1;
                    error!(
                        batch_key = %record.batch_key,
                        error = %e,
                        "Delivered batch could not be removed from spool"
                    );
                }
                return;
            }
            Err(err) => err,
        };

        record.retry_count += 1;
        record.last_error = err.to_string();

        if record.retry_count < self.config.spool_max_retries {
            match self.spool.update(&record) {
                Ok(()) => {
                    summary.requeued += 1;
                    warn!(
                        batch_key = %record.batch_key,
                        retry_count = record.retry_count,
                        ceiling = self.config.spool_max_retries,
                        error = %err,
                        "Resend failed, batch stays spooled"
                    );
                }
                Err(e) => {
                    summary.storage_errors += 1;
                    error!(
                        batch_key = %record.batch_key,
                        error = %e,
                        "Failed to update spool entry"
                    );
                }
            }
            return;
        }

        match self.spool.move_to_dead_letter(&record) {
            Ok(path) => {
                counters.batches_dead_lettered += 1;
                counters.records_failed += record_count as u64;
                summary.dead_lettered += 1;
                error!(
                    batch_key = %record.batch_key,
                    retry_count = record.retry_count,
                    path = %path.display(),
                    error = %err,
                    "Spool retries exhausted, batch dead-lettered"
                );
                self.notify(&record, &path).await;
            }
            Err(e) => {
                summary.storage_errors += 1;
                error!(
                    batch_key = %record.batch_key,
                    error = %e,
                    "Failed to move batch to dead-letter"
                );
            }
        }
    }

    /// Best effort: failures are logged and dropped.
    async fn notify(&self, record: &SpoolRecord, path: &Path) {
        let notice = DeadLetterNotice {
            title: DEAD_LETTER_TITLE.to_string(),
            file_path: path.to_path_buf(),
            batch_key: record.batch_key.clone(),
            last_error: record.last_error.clone(),
            first_attempt_at: record.first_attempt_at,
            retry_count: record.retry_count,
        };

        if let Err(e) = self.notifier.send_error_notification(&notice).await {
            warn!(
                batch_key = %record.batch_key,
                error = %e,
                "Dead-letter notification failed"
            );
        }
    }
}

fn delivered(response: &HttpResponse, batch_key: &str, records: usize) -> SendOutcome {
    if response.status == 409 {
        info!(batch_key = %batch_key, records, "Batch already recorded downstream");
        SendOutcome::Duplicate
    } else {
        info!(batch_key = %batch_key, records, status = response.status, "Batch delivered");
        SendOutcome::Delivered
    }
}
