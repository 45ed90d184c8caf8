//! Fetch configuration
//!
//! Politeness and cache settings, loadable from a JSON file. Every field is
//! optional and falls back to the library defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::default_cache_dir;
use crate::http::{ClientConfig, PacingPolicy, DEFAULT_USER_AGENT};
use crate::overpass::DEFAULT_ENDPOINT;

/// Errors loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Settings for pacing, retries and the response cache
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Requests per pacing window
    pub n_delay: u32,
    /// Minimum seconds between the start of a window and the next pause's end
    pub delay_seconds: f64,
    /// Hours to keep retrying transient failures
    pub retry_connection_error_hours: f64,
    /// Per-call HTTP timeout
    pub request_timeout_seconds: u64,
    /// User-Agent header value
    pub user_agent: String,
    /// Cache root; defaults to the platform cache directory
    pub cache_dir: Option<PathBuf>,
    /// Overpass interpreter URL
    pub overpass_endpoint: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            n_delay: 10,
            delay_seconds: 30.0,
            retry_connection_error_hours: 1.0,
            request_timeout_seconds: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_dir: None,
            overpass_endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.client_config()?;
        Ok(config)
    }

    /// Cache root to use
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Pacing and retry settings for a [`crate::http::PacedClient`]
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let delay = seconds("delay_seconds", self.delay_seconds)?;
        let retry_window = seconds(
            "retry_connection_error_hours",
            self.retry_connection_error_hours * 3600.0,
        )?;

        Ok(ClientConfig {
            pacing: PacingPolicy {
                n_delay: self.n_delay,
                delay,
            },
            retry_window,
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            user_agent: self.user_agent.clone(),
        })
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::Invalid(format!("{} must be a non-negative number", field)))
}
