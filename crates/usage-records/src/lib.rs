//! Outbound usage records and their idempotency keys.
//!
//! Every record carries a key derived purely from its identity fields, and
//! every batch carries a key derived from the sorted set of record keys.
//! Re-sending the same logical batch, whether from a live run or from the
//! spool, always reproduces the same batch key, which the metering API uses
//! for deduplication.

mod error;
pub mod keys;
mod record;

pub use error::{RecordError, RecordResult};
pub use keys::{batch_key, record_key, DEFAULT_KEY_PREFIX};
pub use record::{OutboundRecord, RecordBatch, RecordIdentity, UsageMeasures};
