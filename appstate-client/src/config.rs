//! Configuration for the sync orchestrator.
//!
//! Loaded from a TOML file; every field is optional and falls back to its
//! default.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning knobs for [`AppStateSync`](crate::AppStateSync).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Attempts per send of one patch, including the first (default: 3).
    /// Values below 1 are treated as 1.
    #[serde(default = "default_send_attempts")]
    pub send_attempts: u32,
    /// Pause between send attempts in milliseconds (default: 250).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// How long to wait for an incoming patch in seconds (default: 30).
    /// 0 waits forever.
    #[serde(default = "default_recv_timeout_secs")]
    pub recv_timeout_secs: u64,
}

fn default_send_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_recv_timeout_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            send_attempts: default_send_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            recv_timeout_secs: default_recv_timeout_secs(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Effective number of send attempts, at least 1.
    pub fn attempts(&self) -> u32 {
        self.send_attempts.max(1)
    }

    /// Pause between send attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Receive timeout, `None` to wait forever.
    pub fn recv_timeout(&self) -> Option<Duration> {
        (self.recv_timeout_secs > 0).then(|| Duration::from_secs(self.recv_timeout_secs))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}
