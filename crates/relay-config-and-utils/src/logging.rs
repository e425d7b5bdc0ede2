//! Logging initialization for the relay.
//!
//! Thin wrapper over the observability crate so every entry point sets up
//! the same layers: compact stderr output plus the JSONL file under
//! `~/.usage-relay/logs/relay.jsonl`.

use crate::Paths;

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(service_name: &str, level: &str, paths: Option<&Paths>) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: paths.map(Paths::log_file),
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
