//! Persisted spool and dead-letter record shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use usage_records::{OutboundRecord, RecordBatch, RecordResult};

/// One undelivered batch as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoolRecord {
    pub batch_key: String,
    pub records: Vec<OutboundRecord>,
    /// When the batch was first attempted and spooled.
    pub first_attempt_at: DateTime<Utc>,
    /// Failed resend cycles so far.
    pub retry_count: u32,
    pub last_error: String,
}

/// Dead-lettered batches keep the spool record shape.
pub type DeadLetterRecord = SpoolRecord;

impl SpoolRecord {
    /// Record for a batch that just exhausted its immediate retries.
    pub fn new(batch: &RecordBatch, first_attempt_at: DateTime<Utc>, last_error: String) -> Self {
        Self {
            batch_key: batch.batch_key().to_string(),
            records: batch.records().to_vec(),
            first_attempt_at,
            retry_count: 0,
            last_error,
        }
    }

    /// Rebuild the batch, verifying the stored key against the records.
    pub fn batch(&self) -> RecordResult<RecordBatch> {
        RecordBatch::from_parts(&self.batch_key, self.records.clone())
    }

    /// Schema check applied to every record read from disk.
    pub fn validate(&self) -> RecordResult<()> {
        self.batch().map(|_| ())
    }

    /// Timestamp fragment used in file names: sortable and free of colons.
    pub fn file_timestamp(&self) -> String {
        self.first_attempt_at
            .format("%Y-%m-%dT%H-%M-%S-%3fZ")
            .to_string()
    }
}

/// Operator-facing view of a dead-letter file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterSummary {
    pub file_name: String,
    pub batch_key: String,
    pub record_count: usize,
    pub first_attempt_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: String,
}

impl DeadLetterSummary {
    pub fn from_record(file_name: String, record: &DeadLetterRecord) -> Self {
        Self {
            file_name,
            batch_key: record.batch_key.clone(),
            record_count: record.records.len(),
            first_attempt_at: record.first_attempt_at,
            retry_count: record.retry_count,
            last_error: record.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use usage_records::{RecordIdentity, UsageMeasures, DEFAULT_KEY_PREFIX};

    fn batch() -> RecordBatch {
        let record = OutboundRecord::new(
            DEFAULT_KEY_PREFIX,
            RecordIdentity {
                usage_date: "2025-01-01".to_string(),
                provider: "openai".to_string(),
                model: "gpt-4".to_string(),
                app_id: Some("app-123".to_string()),
                user_id: None,
            },
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            UsageMeasures::default(),
        );
        RecordBatch::new(vec![record]).unwrap()
    }

    #[test]
    fn new_record_starts_at_zero_retries() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let record = SpoolRecord::new(&batch(), at, "HTTP 500".to_string());
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.first_attempt_at, at);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn file_timestamp_is_colon_free_and_millisecond_precise() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::milliseconds(67);
        let record = SpoolRecord::new(&batch(), at, String::new());
        assert_eq!(record.file_timestamp(), "2025-01-02T03-04-05-067Z");
    }

    #[test]
    fn validate_rejects_empty_and_mismatched_records() {
        let mut record = SpoolRecord::new(&batch(), Utc::now(), String::new());
        record.batch_key = "0".repeat(64);
        assert!(record.validate().is_err());

        record.records.clear();
        assert!(record.validate().is_err());
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let record = SpoolRecord::new(&batch(), Utc::now(), "boom".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("batchKey").is_some());
        assert!(json.get("firstAttemptAt").is_some());
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["lastError"], "boom");
    }
}
