//! Configuration for the HTTP fetcher

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for [`HttpFetcher`](crate::HttpFetcher)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum idle connections kept per host (default: 10)
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Whether to reject origins that do not advertise
    /// `Accept-Ranges: bytes` (default: false)
    #[serde(default)]
    pub require_accept_ranges: bool,

    /// User-Agent header sent with every request (default: crate name and
    /// version)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_pool_max_idle() -> usize {
    10
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_secs: default_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle(),
            require_accept_ranges: false,
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(FetchConfig)` if loading and validation succeed
    /// * `Err(StreamError::Config)` if the file cannot be read or the
    ///   config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| StreamError::Config(format!("failed to read config file: {}", e)))?;

        let config: FetchConfig = serde_yaml::from_str(&content)
            .map_err(|e| StreamError::Config(format!("failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - `timeout_secs` must be greater than 0
    /// - `user_agent` must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(StreamError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.user_agent.is_empty() {
            return Err(StreamError::Config(
                "user_agent must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
