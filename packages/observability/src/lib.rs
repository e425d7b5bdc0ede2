//! # Observability
//!
//! Centralized logging layer for the usage relay.
//!
//! Crates are **log producers**: they use standard `tracing` macros and know
//! nothing about where the output goes. The binary calls
//! [`init_with_config`] once at startup, which installs:
//!
//! - an `EnvFilter` (from `RUST_LOG`, falling back to the configured level),
//! - a compact human-readable layer on stderr, and
//! - optionally a JSONL file layer whose structured fields pass through
//!   [`redact::sanitize_value`] so credentials never land on disk.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "usage-relay".into(),
//!         default_level: "debug".into(),
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod file_writer;
mod json_layer;
pub mod redact;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file_writer::{LogFileWriter, WriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG`.
    pub default_level: String,

    /// JSONL log file. `None` disables the file layer.
    pub log_path: Option<PathBuf>,

    /// Emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize the global subscriber.
///
/// Calling this more than once is harmless; later calls are ignored.
/// If the log file cannot be opened the file layer is skipped and a
/// warning is emitted on the remaining layers.
pub fn init_with_config(config: LogConfig) {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let mut file_error = None;
    let json_layer = match &config.log_path {
        Some(path) => match LogFileWriter::new(path) {
            Ok(writer) => Some(
                JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer))
                    .with_filter(env_filter()),
            ),
            Err(err) => {
                file_error = Some((path.clone(), err));
                None
            }
        },
        None => None,
    };

    let stderr_layer = if config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(env_filter()),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    if let Some((path, err)) = file_error {
        tracing::warn!(
            log_path = %path.display(),
            error = %err,
            "failed to open log file, continuing without file output"
        );
    }

    tracing::debug!(
        service = %config.service_name,
        log_path = ?config.log_path,
        "observability initialized"
    );
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(config.also_stderr);
    }

    #[test]
    fn init_twice_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            service_name: "test".into(),
            log_path: Some(dir.path().join("relay.jsonl")),
            also_stderr: false,
            ..Default::default()
        };
        init_with_config(config.clone());
        init_with_config(config);
    }
}
