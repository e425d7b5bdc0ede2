//! Batch delivery command.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use usage_outbox::{RunReport, SendOutcome};
use usage_records::{OutboundRecord, RecordBatch, RecordIdentity, UsageMeasures};

/// One input line item, as produced by the transform stage.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInput {
    #[serde(flatten)]
    identity: RecordIdentity,
    /// Source timestamp; defaults to now.
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    measures: UsageMeasures,
}

fn parse_batch(input: &str, key_prefix: &str) -> Result<RecordBatch> {
    let inputs: Vec<RecordInput> =
        serde_json::from_str(input).context("input must be a JSON array of usage records")?;
    if inputs.is_empty() {
        bail!("no records to send");
    }

    let now = Utc::now();
    let records = inputs
        .into_iter()
        .map(|r| {
            OutboundRecord::new(key_prefix, r.identity, r.timestamp.unwrap_or(now), r.measures)
        })
        .collect();
    Ok(RecordBatch::new(records)?)
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Deliver one batch.
pub async fn send(ctx: &Context, file: Option<&Path>, key_prefix: &str) -> Result<()> {
    let batch = parse_batch(&read_input(file)?, key_prefix)?;
    let sender = ctx.sender()?;
    let _lock = ctx.lock()?;

    let mut report = RunReport::new("send");
    let outcome = match sender.send(&batch, report.counters_mut()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            report.mark_failed();
            return Err(e.into());
        }
    };

    let (status, path) = match &outcome {
        SendOutcome::Delivered => ("delivered", None),
        SendOutcome::Duplicate => ("duplicate", None),
        SendOutcome::Spooled { path } => ("spooled", Some(path.display().to_string())),
    };

    match ctx.format {
        OutputFormat::Text => {
            let key = output::short_key(batch.batch_key());
            match &path {
                Some(path) => println!(
                    "Delivery deferred: batch {} ({} records) spooled to {}",
                    key,
                    batch.len(),
                    path
                ),
                None => println!("Batch {} {} ({} records)", key, status, batch.len()),
            }
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "status": status,
            "batchKey": batch.batch_key(),
            "records": batch.len(),
            "spoolPath": path,
            "counters": report.counters(),
        }))?,
    }

    Ok(())
}
