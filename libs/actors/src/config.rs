//! Runtime Configuration
//!
//! Pool capacities and per-thread idle timeouts, loaded from TOML:
//!
//! ```toml
//! transaction_pool_capacity = 5
//! runnable_pool_capacity = 5
//! pool_keep_alive_ms = 300000
//!
//! [threads.storage]
//! idle_timeout_ms = 30000
//! ```

use crate::error::ActorError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Runtime configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ActorsConfig {
    /// Free-list capacity of envelopes for dedicated, foreign-loop and remote bindings
    pub transaction_pool_capacity: usize,

    /// Free-list capacity of envelopes for pool-backed bindings
    pub runnable_pool_capacity: usize,

    /// Idle keep-alive of threads in a runtime-created pool
    pub pool_keep_alive_ms: u64,

    /// Named dedicated thread settings
    pub threads: HashMap<String, ThreadSettings>,
}

/// Settings of one named dedicated thread
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ThreadSettings {
    /// Absent means the worker never stops on its own
    pub idle_timeout_ms: Option<u64>,
}

impl Default for ActorsConfig {
    fn default() -> Self {
        Self {
            transaction_pool_capacity: crate::transaction::MAX_POOL_SIZE,
            runnable_pool_capacity: crate::transaction::MAX_POOL_SIZE,
            pool_keep_alive_ms: 300_000,
            threads: HashMap::new(),
        }
    }
}

impl ActorsConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).context("Failed to deserialize actors configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read actors configuration: {}", path.display()))?;
        let config = Self::from_toml_str(&source)
            .with_context(|| format!("Invalid actors configuration: {}", path.display()))?;
        debug!(
            path = %path.display(),
            threads = config.threads.len(),
            "Loaded actors configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ActorError> {
        if self.transaction_pool_capacity == 0 {
            return Err(ActorError::configuration(
                "pool capacity must be positive",
                Some("transaction_pool_capacity"),
            ));
        }
        if self.runnable_pool_capacity == 0 {
            return Err(ActorError::configuration(
                "pool capacity must be positive",
                Some("runnable_pool_capacity"),
            ));
        }
        Ok(())
    }

    pub fn pool_keep_alive(&self) -> Duration {
        Duration::from_millis(self.pool_keep_alive_ms)
    }

    /// Configured idle timeout of a named thread, `None` when it never stops
    pub fn idle_timeout(&self, thread: &str) -> Option<Duration> {
        self.threads
            .get(thread)
            .and_then(|settings| settings.idle_timeout_ms)
            .map(Duration::from_millis)
    }
}
