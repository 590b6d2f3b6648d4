//! Worker configuration.
//!
//! All fields carry serde defaults, so an absent file or empty environment
//! yields a fully usable configuration. Sources, later overriding earlier:
//!  1. `config/jobq.*` next to the working directory (toml/json)
//!  2. Environment variables prefixed `JOBQ__` (double-underscore separator),
//!     e.g. `JOBQ__MAX_MESSAGES=5`

use crate::backoff::{BackoffPolicy, ExponentialBackoff};
use crate::error::WorkerError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Dispatcher-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Default receive wait in seconds for `process_batch`
    pub wait_seconds: u64,

    /// Default batch size for `process_batch`
    pub max_messages: usize,

    /// Backoff applied where a registration names no policy
    pub backoff: BackoffSettings,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            wait_seconds: 1,
            max_messages: 10,
            backoff: BackoffSettings::default(),
        }
    }
}

/// Settings for the default exponential backoff policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    /// Base delay in seconds for the first retry
    pub base_seconds: f64,

    /// Cap on the visibility delay in seconds
    pub max_visibility_timeout_seconds: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_seconds: 1.0,
            max_visibility_timeout_seconds: 900.0,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from file and environment sources
    pub fn load() -> Result<Self, WorkerError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/jobq").required(false))
            .add_source(config::Environment::with_prefix("JOBQ").separator("__"))
            .build()
            .map_err(|err| WorkerError::Configuration {
                message: err.to_string(),
            })?;

        settings
            .try_deserialize()
            .map_err(|err| WorkerError::Configuration {
                message: err.to_string(),
            })
    }

    /// Default receive wait as a duration
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    /// Build the default backoff policy from the configured settings
    pub fn default_backoff(&self) -> Arc<dyn BackoffPolicy> {
        Arc::new(ExponentialBackoff::new(
            Duration::from_secs_f64(self.backoff.base_seconds),
            Duration::from_secs_f64(self.backoff.max_visibility_timeout_seconds),
        ))
    }
}
