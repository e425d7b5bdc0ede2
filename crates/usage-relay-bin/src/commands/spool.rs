//! Spool commands.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use usage_outbox::RunReport;
use usage_spool::SpoolStore;

/// Retry every spooled batch.
pub async fn resend_spooled(ctx: &Context) -> Result<()> {
    let sender = ctx.sender()?;
    let _lock = ctx.lock()?;

    let mut report = RunReport::new("resend-spooled");
    let summary = match sender.resend_spooled(report.counters_mut()).await {
        Ok(summary) => summary,
        Err(e) => {
            report.mark_failed();
            return Err(e.into());
        }
    };
    if summary.storage_errors > 0 {
        report.mark_failed();
    }

    match ctx.format {
        OutputFormat::Text => {
            if summary.attempted == 0 {
                println!("Spool is empty");
            } else {
                println!("Resent {} spooled batches", summary.attempted);
                output::print_row("Recovered", &summary.recovered.to_string());
                output::print_row("Still spooled", &summary.requeued.to_string());
                output::print_row("Dead-lettered", &summary.dead_lettered.to_string());
                if summary.storage_errors > 0 {
                    output::print_row("Storage errors", &summary.storage_errors.to_string());
                }
            }
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "summary": summary,
            "counters": report.counters(),
        }))?,
    }

    Ok(())
}

/// List spooled batches, oldest first.
pub fn spool_list(ctx: &Context) -> Result<()> {
    // Listing quarantines invalid files, so it mutates the spool.
    let _lock = ctx.lock()?;
    let records = ctx.store().list()?;

    match ctx.format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("Spool is empty");
                return Ok(());
            }
            println!(
                "{:<14} {:>7} {:>7} {:<26} {}",
                "Batch", "Records", "Retries", "First Attempt", "Last Error"
            );
            output::print_divider();
            for record in &records {
                println!(
                    "{:<14} {:>7} {:>7} {:<26} {}",
                    output::short_key(&record.batch_key),
                    record.records.len(),
                    record.retry_count,
                    record.first_attempt_at.to_rfc3339(),
                    record.last_error
                );
            }
        }
        OutputFormat::Json => {
            let rows: Vec<_> = records
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "batchKey": r.batch_key,
                        "recordCount": r.records.len(),
                        "firstAttemptAt": r.first_attempt_at,
                        "retryCount": r.retry_count,
                        "lastError": r.last_error,
                    })
                })
                .collect();
            output::print_json(&rows)?;
        }
    }

    Ok(())
}
