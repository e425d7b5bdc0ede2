//! Per-run delivery counters.

use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Counters mutated by the sender during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCounters {
    /// Records accepted downstream, including duplicates.
    pub records_sent: u64,
    /// Records rejected or dead-lettered.
    pub records_failed: u64,
    pub batches_spooled: u64,
    pub batches_recovered: u64,
    pub batches_dead_lettered: u64,
}

/// Owns the counters of one run and logs a summary when dropped.
///
/// The summary is written on every exit path, including early returns
/// through `?`.
#[derive(Debug)]
pub struct RunReport {
    run: &'static str,
    started: Instant,
    counters: DeliveryCounters,
    failed: bool,
}

impl RunReport {
    pub fn new(run: &'static str) -> Self {
        Self {
            run,
            started: Instant::now(),
            counters: DeliveryCounters::default(),
            failed: false,
        }
    }

    pub fn counters(&self) -> &DeliveryCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut DeliveryCounters {
        &mut self.counters
    }

    /// Mark the run as failed; the summary is then logged at warn.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for RunReport {
    fn drop(&mut self) {
        let c = &self.counters;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if self.failed || std::thread::panicking() {
            warn!(
                run = self.run,
                elapsed_ms,
                records_sent = c.records_sent,
                records_failed = c.records_failed,
                batches_spooled = c.batches_spooled,
                batches_recovered = c.batches_recovered,
                batches_dead_lettered = c.batches_dead_lettered,
                "Run finished with errors"
            );
        } else {
            info!(
                run = self.run,
                elapsed_ms,
                records_sent = c.records_sent,
                records_failed = c.records_failed,
                batches_spooled = c.batches_spooled,
                batches_recovered = c.batches_recovered,
                batches_dead_lettered = c.batches_dead_lettered,
                "Run finished"
            );
        }
    }
}
