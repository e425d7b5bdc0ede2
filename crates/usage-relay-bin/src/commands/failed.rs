//! Dead-letter commands.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use tracing::info;
use usage_outbox::SendOutcome;
use usage_spool::DeadLetterStore;

/// List dead-lettered batches.
pub fn failed_list(ctx: &Context) -> Result<()> {
    let summaries = ctx.store().list_failed()?;

    match ctx.format {
        OutputFormat::Text => {
            if summaries.is_empty() {
                println!("No dead-lettered batches");
                return Ok(());
            }
            println!(
                "{:<60} {:>7} {:>7} {}",
                "File", "Records", "Retries", "Last Error"
            );
            output::print_divider();
            for s in &summaries {
                println!(
                    "{:<60} {:>7} {:>7} {}",
                    s.file_name, s.record_count, s.retry_count, s.last_error
                );
            }
        }
        OutputFormat::Json => output::print_json(&summaries)?,
    }

    Ok(())
}

/// Show one dead-letter file.
pub fn failed_show(ctx: &Context, file: &str) -> Result<()> {
    let record = ctx.store().read_failed(file)?;

    match ctx.format {
        OutputFormat::Text => {
            println!("{}", file);
            output::print_divider();
            output::print_row("Batch", &record.batch_key);
            output::print_row("Records", &record.records.len().to_string());
            output::print_row("First attempt", &record.first_attempt_at.to_rfc3339());
            output::print_row("Retries", &record.retry_count.to_string());
            output::print_row("Last error", &record.last_error);
            println!();
            for r in &record.records {
                println!(
                    "  {}  in={} out={} cost=${:.4}",
                    r.idempotency_key,
                    r.measures.input_tokens,
                    r.measures.output_tokens,
                    r.measures.cost_usd
                );
            }
        }
        OutputFormat::Json => output::print_json(&record)?,
    }

    Ok(())
}

/// Delete one dead-letter file.
pub fn failed_delete(ctx: &Context, file: &str) -> Result<()> {
    let _lock = ctx.lock()?;
    ctx.store().delete_failed(file)?;
    output::print_success(&format!("Deleted {}", file), &ctx.format);
    Ok(())
}

/// Make one delivery attempt for a dead-letter file, deleting it on success
/// unless `keep` is set.
pub async fn failed_resend(ctx: &Context, file: &str, keep: bool) -> Result<()> {
    let sender = ctx.sender()?;
    let _lock = ctx.lock()?;
    let store = ctx.store();
    let record = store.read_failed(file)?;

    let outcome = sender.resend_failed_file(&record).await?;
    let verb = match outcome {
        SendOutcome::Duplicate => "already recorded",
        _ => "delivered",
    };

    if keep {
        output::print_success(
            &format!(
                "Batch {} {}; kept {}",
                output::short_key(&record.batch_key),
                verb,
                file
            ),
            &ctx.format,
        );
    } else {
        store.delete_failed(file)?;
        info!(file = %file, batch_key = %record.batch_key, "Dead-letter batch resent and removed");
        output::print_success(
            &format!(
                "Batch {} {}; removed {}",
                output::short_key(&record.batch_key),
                verb,
                file
            ),
            &ctx.format,
        );
    }

    Ok(())
}
