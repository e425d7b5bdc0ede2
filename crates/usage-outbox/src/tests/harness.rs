//! Test harness for delivery scenarios.
//!
//! Provides:
//! - ScriptedTransport: replays queued responses and records every request
//! - RecordingNotifier: captures notices, optionally failing each call
//! - BrokenSpool: a spool whose writes always fail
//! - TestHarness: a Sender wired to the above over a temp spool directory
//! - LogCapture: a tracing writer that keeps everything in memory

use crate::client::{DeliveryClient, DeliveryClientConfig};
use crate::notifier::{DeadLetterNotice, Notifier};
use crate::sender::{Sender, SenderConfig};
use crate::transport::{HttpResponse, HttpTransport};
use crate::{NotifyError, TransportError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;
use usage_records::{OutboundRecord, RecordBatch, RecordIdentity, UsageMeasures};
use usage_spool::{FileSpoolStore, SpoolError, SpoolRecord, SpoolResult, SpoolStore};

pub const TEST_TOKEN: &str = "tok_test_0123456789";

/// A request seen by the scripted transport.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub bearer_token: String,
    pub body: serde_json::Value,
}

/// Transport that replays a queue of outcomes.
///
/// Once the queue is empty every request fails with a connect error.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, status: u16) {
        self.push(Ok(HttpResponse::new(status)));
    }

    pub fn push_statuses(&self, status: u16, times: usize) {
        for _ in 0..times {
            self.push_status(status);
        }
    }

    pub fn push(&self, outcome: Result<HttpResponse, TransportError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer_token: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            bearer_token: bearer_token.to_string(),
            body: body.clone(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".into())))
    }
}

/// In-memory log sink for asserting on formatted tracing output.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// A subscriber that formats every level into this capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Notifier that records notices.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<DeadLetterNotice>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A notifier that records and then reports failure.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            notices: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn notices(&self) -> Vec<DeadLetterNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_error_notification(&self, notice: &DeadLetterNotice) -> Result<(), NotifyError> {
        self.notices.lock().unwrap().push(notice.clone());
        if self.fail {
            return Err(NotifyError::Status {
                status: 500,
                body: "webhook down".into(),
            });
        }
        Ok(())
    }
}

/// Spool whose every write fails.
pub struct BrokenSpool;

impl BrokenSpool {
    fn fail<T>() -> SpoolResult<T> {
        Err(SpoolError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }
}

impl SpoolStore for BrokenSpool {
    fn save(&self, _record: &SpoolRecord) -> SpoolResult<PathBuf> {
        Self::fail()
    }
    fn list(&self) -> SpoolResult<Vec<SpoolRecord>> {
        Self::fail()
    }
    fn update(&self, _record: &SpoolRecord) -> SpoolResult<()> {
        Self::fail()
    }
    fn delete(&self, _batch_key: &str) -> SpoolResult<()> {
        Self::fail()
    }
    fn move_to_dead_letter(&self, _record: &SpoolRecord) -> SpoolResult<PathBuf> {
        Self::fail()
    }
}

/// Client config with millisecond delays so retry tests stay fast.
pub fn fast_client_config(max_retries: u32) -> DeliveryClientConfig {
    DeliveryClientConfig {
        base_url: "https://metering.test/api".into(),
        api_token: TEST_TOKEN.into(),
        max_retries,
        retry_base_delay: Duration::from_millis(1),
        max_retry_delay: Duration::from_millis(5),
    }
}

pub fn record(app: &str) -> OutboundRecord {
    OutboundRecord::new(
        "usage",
        RecordIdentity {
            usage_date: "2025-01-01".into(),
            provider: "openai".into(),
            model: "gpt-4".into(),
            app_id: Some(app.into()),
            user_id: None,
        },
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        UsageMeasures {
            input_tokens: 1200,
            output_tokens: 300,
            request_count: 4,
            cost_usd: 0.042,
            ..Default::default()
        },
    )
}

pub fn batch(apps: &[&str]) -> RecordBatch {
    RecordBatch::new(apps.iter().map(|a| record(a)).collect()).unwrap()
}

/// A sender over a temp spool with a scripted transport.
pub struct TestHarness {
    pub transport: Arc<ScriptedTransport>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<FileSpoolStore>,
    pub sender: Sender,
    _temp_dir: TempDir,
}

impl TestHarness {
    /// 3 immediate retries, spool ceiling 5.
    pub fn new() -> Self {
        Self::with_notifier(RecordingNotifier::new(), 5)
    }

    pub fn with_ceiling(spool_max_retries: u32) -> Self {
        Self::with_notifier(RecordingNotifier::new(), spool_max_retries)
    }

    pub fn with_notifier(notifier: Arc<RecordingNotifier>, spool_max_retries: u32) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileSpoolStore::new(
            temp_dir.path().join("spool"),
            temp_dir.path().join("failed"),
        ));
        let transport = ScriptedTransport::new();
        let client = DeliveryClient::new(fast_client_config(3), transport.clone());
        let sender = Sender::new(
            client,
            store.clone(),
            notifier.clone(),
            SenderConfig {
                usage_path: "/usage".into(),
                spool_max_retries,
            },
        );

        Self {
            transport,
            notifier,
            store,
            sender,
            _temp_dir: temp_dir,
        }
    }

    pub fn spool_files(&self) -> Vec<PathBuf> {
        list_dir(self.store.spool_dir(), "spool_")
    }

    pub fn failed_files(&self) -> Vec<PathBuf> {
        list_dir(self.store.failed_dir(), "failed_")
    }
}

fn list_dir(dir: &std::path::Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    paths.sort();
    paths
}
