//! Outbound record and batch types.

use crate::keys::{batch_key, record_key};
use crate::{RecordError, RecordResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields that identify a usage line item.
///
/// Two records with the same identity describe the same billable usage and
/// must produce the same idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIdentity {
    /// Usage day, `YYYY-MM-DD`.
    pub usage_date: String,
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Numeric measures carried by a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageMeasures {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub request_count: u64,
    pub cost_usd: f64,
}

/// One billable usage line item as sent to the metering API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRecord {
    pub idempotency_key: String,
    /// Source timestamp of the usage.
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub identity: RecordIdentity,
    pub measures: UsageMeasures,
}

impl OutboundRecord {
    /// Build a record, deriving its idempotency key from `identity`.
    pub fn new(
        key_prefix: &str,
        identity: RecordIdentity,
        timestamp: DateTime<Utc>,
        measures: UsageMeasures,
    ) -> Self {
        Self {
            idempotency_key: record_key(key_prefix, &identity),
            timestamp,
            identity,
            measures,
        }
    }
}

/// A non-empty group of records delivered in one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    batch_key: String,
    records: Vec<OutboundRecord>,
}

impl RecordBatch {
    /// Build a batch and compute its key.
    pub fn new(records: Vec<OutboundRecord>) -> RecordResult<Self> {
        if records.is_empty() {
            return Err(RecordError::EmptyBatch);
        }
        if let Some(index) = records.iter().position(|r| r.idempotency_key.is_empty()) {
            return Err(RecordError::MissingRecordKey(index));
        }

        let batch_key = batch_key(records.iter().map(|r| r.idempotency_key.as_str()));
        Ok(Self { batch_key, records })
    }

    /// Rebuild a batch from persisted parts, checking the stored key.
    pub fn from_parts(stored_key: &str, records: Vec<OutboundRecord>) -> RecordResult<Self> {
        let batch = Self::new(records)?;
        if batch.batch_key != stored_key {
            return Err(RecordError::BatchKeyMismatch {
                stored: stored_key.to_string(),
                computed: batch.batch_key,
            });
        }
        Ok(batch)
    }

    pub fn batch_key(&self) -> &str {
        &self.batch_key
    }

    pub fn records(&self) -> &[OutboundRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<OutboundRecord> {
        self.records
    }
}
