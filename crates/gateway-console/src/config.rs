//! Console configuration.
//!
//! Loaded from YAML; every field has a default so a config file only needs the
//! values it overrides:
//!
//! ```yaml
//! backend_url: https://gateway.example.com
//! request_timeout: 30s
//! sync:
//!   max_attempts: 5
//!   initial_backoff: 250ms
//!   max_backoff: 10s
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Backend the reference gateway listens on.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8005";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Retry policy for snapshot pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Total delivery attempts per snapshot, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubled after every failed attempt
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Upper bound on the retry delay
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Base URL of the gateway backend
    pub backend_url: String,
    /// Per-request deadline; `None` leaves the transport default in place
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    pub sync: SyncConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout: None,
            sync: SyncConfig::default(),
        }
    }
}

impl ConsoleConfig {
    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend_url must not be empty".into()));
        }
        if self.sync.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "sync.max_attempts must be at least 1".into(),
            ));
        }
        if self.sync.initial_backoff > self.sync.max_backoff {
            return Err(ConfigError::Invalid(
                "sync.initial_backoff must not exceed sync.max_backoff".into(),
            ));
        }
        Ok(())
    }
}
