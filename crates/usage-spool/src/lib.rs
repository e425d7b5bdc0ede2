//! Durable spool for usage batches that could not be delivered.
//!
//! Each undelivered batch lives in its own JSON file
//! (`spool_{timestamp}_{batchKey}.json`, mode 600). Batches that exhaust the
//! spool retry ceiling move to a parallel dead-letter directory
//! (`failed_{timestamp}_{batchKey}.json`) where they wait for an operator.
//!
//! The store is the single source of truth: nothing is cached in memory
//! between runs, so a restarted process picks up exactly what is on disk.
//!
//! Writes go through a temp file and an atomic rename, so a concurrent
//! reader never sees a half-written record. Cross-process exclusion between
//! a scheduled run and an operator command is provided by [`SpoolLock`].

mod atomic;
mod error;
mod lock;
mod record;
mod store;

pub use error::{SpoolError, SpoolResult};
pub use lock::{SpoolLock, DEFAULT_STALE_AFTER, LOCK_FILE_NAME};
pub use record::{DeadLetterRecord, DeadLetterSummary, SpoolRecord};
pub use store::{
    DeadLetterStore, FileSpoolStore, SpoolStore, FAILED_PREFIX, SPOOL_EXTENSION, SPOOL_PREFIX,
};
