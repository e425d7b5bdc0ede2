//! File system paths for the relay.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Name of the base directory under the user's home.
const BASE_DIR_NAME: &str = ".usage-relay";

/// Manages file system paths for the relay.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for relay state (~/.usage-relay)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.usage-relay`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.usage-relay).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.usage-relay/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the spool directory (~/.usage-relay/spool).
    pub fn spool_dir(&self) -> PathBuf {
        self.base_dir.join("spool")
    }

    /// Get the dead-letter directory (~/.usage-relay/failed).
    pub fn failed_dir(&self) -> PathBuf {
        self.base_dir.join("failed")
    }

    /// Get the logs directory (~/.usage-relay/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.usage-relay/logs/relay.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("relay.jsonl")
    }
}
