//! Configuration management for the relay.
//!
//! Precedence, lowest to highest: built-in defaults, `config.json`,
//! `USAGE_RELAY_*` environment variables, CLI flags (applied by the binary).

use crate::{CoreError, CoreResult, Paths};
use observability::redact::mask_secret;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default downstream metering API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://metering.example.com/api";

/// Default path the usage batches are posted to.
pub const DEFAULT_USAGE_PATH: &str = "/usage";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_API_URL: &str = "USAGE_RELAY_API_URL";
const ENV_API_TOKEN: &str = "USAGE_RELAY_API_TOKEN";
const ENV_TIMEOUT_SECS: &str = "USAGE_RELAY_TIMEOUT_SECS";
const ENV_MAX_RETRIES: &str = "USAGE_RELAY_MAX_RETRIES";
const ENV_SPOOL_MAX_RETRIES: &str = "USAGE_RELAY_SPOOL_MAX_RETRIES";
const ENV_NOTIFY_WEBHOOK_URL: &str = "USAGE_RELAY_NOTIFY_WEBHOOK_URL";
const ENV_LOG_LEVEL: &str = "USAGE_RELAY_LOG_LEVEL";

/// Main relay configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Downstream metering API base URL.
    pub api_base_url: String,
    /// Bearer credential, read from the file or environment.
    pub api_token: Option<String>,
    /// Path appended to the base URL for batch delivery.
    pub usage_path: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Immediate retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Cap for computed backoff in milliseconds (Retry-After is not capped).
    pub max_retry_delay_ms: u64,
    /// Failed resend cycles before a spooled batch is dead-lettered.
    pub spool_max_retries: u32,
    /// Spool directory override.
    pub spool_dir: Option<PathBuf>,
    /// Dead-letter directory override.
    pub failed_dir: Option<PathBuf>,
    /// Webhook receiving dead-letter notifications.
    pub notify_webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            usage_path: DEFAULT_USAGE_PATH.to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            max_retry_delay_ms: 60_000,
            spool_max_retries: 5,
            spool_dir: None,
            failed_dir: None,
            notify_webhook_url: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("log_level", &self.log_level)
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_deref().map(mask_secret))
            .field("usage_path", &self.usage_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("max_retry_delay_ms", &self.max_retry_delay_ms)
            .field("spool_max_retries", &self.spool_max_retries)
            .field("spool_dir", &self.spool_dir)
            .field("failed_dir", &self.failed_dir)
            .field(
                "notify_webhook_url",
                &self.notify_webhook_url.as_deref().map(url_origin),
            )
            .finish()
    }
}

impl Config {
    /// Load configuration from `paths.config_file()` if present, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        Self::load_with_file(&paths.config_file())
    }

    /// Load configuration from an explicit file if present, then apply
    /// environment overrides.
    pub fn load_with_file(config_path: &Path) -> CoreResult<Self> {
        let mut config = if config_path.exists() {
            Self::load_from_file(config_path)?
        } else {
            Self::default()
        };
        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override configuration from `USAGE_RELAY_*` environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup. Unparsable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).and_then(non_empty);

        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.api_token = Some(token);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS).and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(retries) = lookup(ENV_MAX_RETRIES).and_then(|v| v.parse().ok()) {
            self.max_retries = retries;
        }
        if let Some(ceiling) = lookup(ENV_SPOOL_MAX_RETRIES).and_then(|v| v.parse().ok()) {
            self.spool_max_retries = ceiling;
        }
        if let Some(url) = lookup(ENV_NOTIFY_WEBHOOK_URL) {
            self.notify_webhook_url = Some(url);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
    }

    /// Check that the configuration can drive a delivery run.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        if self.api_token.as_deref().map_or(true, str::is_empty) {
            return Err(CoreError::Config(format!(
                "API token is not set (use {ENV_API_TOKEN} or api_token in config.json)"
            )));
        }
        if !self.usage_path.starts_with('/') {
            return Err(CoreError::Config(format!(
                "usage_path must start with '/' (got {:?})",
                self.usage_path
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.spool_max_retries == 0 {
            return Err(CoreError::Config(
                "spool_max_retries must be at least 1".to_string(),
            ));
        }
        if let Some(webhook) = &self.notify_webhook_url {
            Url::parse(webhook)?;
        }
        Ok(())
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Resolve the spool directory.
    pub fn spool_dir(&self, paths: &Paths) -> PathBuf {
        self.spool_dir.clone().unwrap_or_else(|| paths.spool_dir())
    }

    /// Resolve the dead-letter directory.
    pub fn failed_dir(&self, paths: &Paths) -> PathBuf {
        self.failed_dir.clone().unwrap_or_else(|| paths.failed_dir())
    }
}

/// Scheme and host only; webhook paths carry credentials.
fn url_origin(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => url.origin().ascii_serialization(),
        Err(_) => "<invalid url>".to_string(),
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.usage_path, "/usage");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.spool_max_retries, 5);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "max_retries": 7, "api_token": "from-file" }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.api_token.as_deref(), Some("from-file"));
        assert_eq!(config.spool_max_retries, 5);
    }

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            (ENV_API_URL, "https://billing.internal/v2"),
            (ENV_API_TOKEN, "  tok-123456789  "),
            (ENV_MAX_RETRIES, "not-a-number"),
            (ENV_SPOOL_MAX_RETRIES, "9"),
            (ENV_LOG_LEVEL, ""),
        ]));

        assert_eq!(config.api_base_url, "https://billing.internal/v2");
        assert_eq!(config.api_token.as_deref(), Some("tok-123456789"));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.spool_max_retries, 9);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_validate_requires_token() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));

        let config = Config {
            api_token: Some("tok".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url_and_zero_ceiling() {
        let config = Config {
            api_token: Some("tok".to_string()),
            api_base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::InvalidUrl(_))));

        let config = Config {
            api_token: Some("tok".to_string()),
            spool_max_retries: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout_and_relative_usage_path() {
        let config = Config {
            api_token: Some("tok".to_string()),
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let config = Config {
            api_token: Some("tok".to_string()),
            usage_path: "usage".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("usage_path"));
    }

    #[test]
    fn test_debug_masks_credentials() {
        let config = Config {
            api_token: Some("sk-live-1234567890".to_string()),
            notify_webhook_url: Some(
                "https://hooks.slack.com/services/T000/B000/SECRETXYZ".to_string(),
            ),
            ..Default::default()
        };
        let rendered = format!("{config:?}");

        assert!(!rendered.contains("sk-live-1234567890"));
        assert!(rendered.contains("sk-l***"));
        assert!(!rendered.contains("SECRETXYZ"));
        assert!(rendered.contains("https://hooks.slack.com"));
    }

    #[test]
    fn test_directory_resolution() {
        let paths = Paths::with_base_dir(PathBuf::from("/srv/relay"));
        let mut config = Config::default();
        assert_eq!(config.spool_dir(&paths), PathBuf::from("/srv/relay/spool"));
        assert_eq!(config.failed_dir(&paths), PathBuf::from("/srv/relay/failed"));

        config.spool_dir = Some(PathBuf::from("/data/spool"));
        assert_eq!(config.spool_dir(&paths), PathBuf::from("/data/spool"));
    }
}
