//! Cache configuration: TTL, byte capacity, eviction target, safety-check cadence.
//! Defaults are the behavioral constants; env vars override them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::translate::fingerprint::CACHE_PREFIX;

/// Default TTL: 7 days.
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 3600;
/// Default capacity: 8 MiB, under the 10 MiB platform quota.
pub const DEFAULT_MAX_SIZE_BYTES: usize = 8 * 1024 * 1024;
/// Evict down to 90% of capacity.
pub const DEFAULT_EVICTION_THRESHOLD: f64 = 0.9;
/// Re-verify size against the eviction target every 10th insertion.
pub const DEFAULT_SAFETY_CHECK_INTERVAL: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid cache config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_size_bytes: usize,
    /// Fraction of `max_size_bytes` eviction shrinks the memory tier to.
    pub eviction_threshold: f64,
    /// Every Nth insertion re-checks the total against the eviction target.
    /// Zero disables the check.
    pub safety_check_interval: u64,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
            safety_check_interval: DEFAULT_SAFETY_CHECK_INTERVAL,
            key_prefix: CACHE_PREFIX.to_string(),
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by `TRANSCACHE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = env_parse("TRANSCACHE_TTL_SECS")? {
            config.ttl_secs = v;
        }
        if let Some(v) = env_parse("TRANSCACHE_MAX_SIZE_BYTES")? {
            config.max_size_bytes = v;
        }
        if let Some(v) = env_parse("TRANSCACHE_EVICTION_THRESHOLD")? {
            config.eviction_threshold = v;
        }
        if let Some(v) = env_parse("TRANSCACHE_SAFETY_CHECK_INTERVAL")? {
            config.safety_check_interval = v;
        }
        if let Ok(prefix) = std::env::var("TRANSCACHE_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::Invalid("ttl_secs must be > 0".into()));
        }
        if self.max_size_bytes == 0 {
            return Err(ConfigError::Invalid("max_size_bytes must be > 0".into()));
        }
        if !(self.eviction_threshold > 0.0 && self.eviction_threshold < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "eviction_threshold must be in (0, 1), got {}",
                self.eviction_threshold
            )));
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Invalid("key_prefix must not be empty".into()));
        }
        Ok(())
    }

    pub fn ttl_ms(&self) -> i64 {
        (self.ttl_secs as i64).saturating_mul(1000)
    }

    /// Size the memory tier is shrunk to once capacity is breached.
    /// Never above capacity, even for a config that failed `validate`.
    pub fn eviction_target(&self) -> usize {
        let target = (self.max_size_bytes as f64 * self.eviction_threshold).floor() as usize;
        target.min(self.max_size_bytes)
    }
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}
