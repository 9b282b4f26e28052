//! Engine Configuration
//!
//! A small set of knobs shared by the network and plugin layers. The active
//! configuration is process-wide, in the same way the runtime registry is:
//! a lazily initialized global behind a lock. Callers that need different
//! settings install a new [`EngineConfig`] before building their containers.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{ReactiveError, Result};

/// Tunables for retry backoff and cache freshness.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base delay for `Fetch::retry`. Retry `k` waits `base * 2^(k-1)`.
    pub retry_backoff_ms: u64,

    /// Freshness window used when a cache is created without an explicit ttl.
    pub cache_ttl_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: 1_000,
            cache_ttl_ms: 5 * 60 * 1_000,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| ReactiveError::Config(e.to_string()))
    }

    /// Set the base delay before the first retry of a fetch cycle.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = millis(backoff);
        self
    }

    /// Set how long a cached entry stays fresh.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = millis(ttl);
        self
    }

    /// Base retry delay. Retry `k` waits this times `2^(k-1)`.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Default freshness window for cached fetches and the cache plugin.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Whole milliseconds in `duration`, clamped to `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

static CONFIG: OnceLock<RwLock<Arc<EngineConfig>>> = OnceLock::new();

fn slot() -> &'static RwLock<Arc<EngineConfig>> {
    CONFIG.get_or_init(|| RwLock::new(Arc::new(EngineConfig::default())))
}

/// Replace the process-wide configuration.
pub fn install(config: EngineConfig) {
    tracing::debug!(?config, "installing engine configuration");
    *slot().write() = Arc::new(config);
}

/// The configuration currently in effect.
pub fn current() -> Arc<EngineConfig> {
    Arc::clone(&slot().read())
}
