//! Configuration for the response cache

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable names read by [`CacheConfig::from_env`]
pub const ENV_ENABLED: &str = "SEEDGPT_CACHE_ENABLED";
pub const ENV_DIR: &str = "SEEDGPT_CACHE_DIR";
pub const ENV_MAX_SIZE: &str = "SEEDGPT_CACHE_MAX_SIZE";
pub const ENV_DEFAULT_TTL_SECS: &str = "SEEDGPT_CACHE_DEFAULT_TTL_SECS";
pub const ENV_EVICTION_FRACTION: &str = "SEEDGPT_CACHE_EVICTION_FRACTION";

/// Configuration for the response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false the cache is a pass-through: every lookup misses, nothing is stored
    pub enabled: bool,

    /// Directory for persisted records; `None` keeps the cache in memory only
    pub directory: Option<PathBuf>,

    /// Maximum number of entries before LRU eviction runs
    pub max_size: usize,

    /// TTL for operation kinds without a table entry; `None` means never expire
    pub default_ttl: Option<Duration>,

    /// Fraction of entries evicted per eviction pass (0.0 - 1.0], at least one entry
    pub eviction_fraction: f64,

    /// Interval for the optional background sweep
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: Some(default_cache_dir()),
            max_size: 1000,
            default_ttl: Some(Duration::from_secs(3600)),
            eviction_fraction: 0.10,
            // Sweep every 10 minutes
            cleanup_interval: Duration::from_secs(600),
        }
    }
}

/// User cache location, `~/.cache/seedgpt` on Linux
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .map(|base| base.join("seedgpt"))
        .unwrap_or_else(|| PathBuf::from(".seedgpt-cache"))
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// In-memory configuration with the default limits
    pub fn in_memory() -> Self {
        Self {
            directory: None,
            ..Default::default()
        }
    }

    /// Load configuration from `SEEDGPT_CACHE_*` environment variables,
    /// falling back to defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = read_env(ENV_ENABLED) {
            config.enabled = parse_bool(&raw).ok_or_else(|| {
                CacheError::Config(format!("{} must be a boolean, got {:?}", ENV_ENABLED, raw))
            })?;
        }

        if let Some(raw) = read_env(ENV_DIR) {
            config.directory = match raw.as_str() {
                "none" | "memory" => None,
                path => Some(PathBuf::from(path)),
            };
        }

        if let Some(raw) = read_env(ENV_MAX_SIZE) {
            config.max_size = raw.parse().map_err(|_| {
                CacheError::Config(format!("{} must be an integer, got {:?}", ENV_MAX_SIZE, raw))
            })?;
        }

        if let Some(raw) = read_env(ENV_DEFAULT_TTL_SECS) {
            let secs: u64 = raw.parse().map_err(|_| {
                CacheError::Config(format!(
                    "{} must be a number of seconds, got {:?}",
                    ENV_DEFAULT_TTL_SECS, raw
                ))
            })?;
            // 0 disables expiration for kinds without a table entry
            config.default_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(raw) = read_env(ENV_EVICTION_FRACTION) {
            config.eviction_fraction = raw.parse().map_err(|_| {
                CacheError::Config(format!(
                    "{} must be a fraction, got {:?}",
                    ENV_EVICTION_FRACTION, raw
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CacheError::Config(
                "max_size must be greater than 0".to_string(),
            ));
        }

        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(CacheError::Config(
                "eviction_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.default_ttl == Some(Duration::ZERO) {
            return Err(CacheError::Config(
                "default_ttl must be positive; use None to disable expiration".to_string(),
            ));
        }

        if self.cleanup_interval.is_zero() {
            return Err(CacheError::Config(
                "cleanup_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of entries removed by one eviction pass over `len` entries
    pub fn eviction_batch(&self, len: usize) -> usize {
        let batch = (len as f64 * self.eviction_fraction).ceil() as usize;
        batch.clamp(1, len.max(1))
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    enabled: Option<bool>,
    directory: Option<Option<PathBuf>>,
    max_size: Option<usize>,
    default_ttl: Option<Option<Duration>>,
    eviction_fraction: Option<f64>,
    cleanup_interval: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Enable or disable the cache
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Persist records under `dir`
    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(Some(dir.into()));
        self
    }

    /// Keep the cache in memory only
    pub fn in_memory(mut self) -> Self {
        self.directory = Some(None);
        self
    }

    /// Set maximum number of cache entries
    pub fn max_size(mut self, max: usize) -> Self {
        self.max_size = Some(max);
        self
    }

    /// Set default TTL for kinds without a table entry
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(Some(ttl));
        self
    }

    /// Entries of kinds without a table entry never expire
    pub fn no_default_expiration(mut self) -> Self {
        self.default_ttl = Some(None);
        self
    }

    /// Set the fraction of entries removed per eviction pass
    pub fn eviction_fraction(mut self, fraction: f64) -> Self {
        self.eviction_fraction = Some(fraction);
        self
    }

    /// Set background sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            enabled: self.enabled.unwrap_or(defaults.enabled),
            directory: self.directory.unwrap_or(defaults.directory),
            max_size: self.max_size.unwrap_or(defaults.max_size),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            eviction_fraction: self.eviction_fraction.unwrap_or(defaults.eviction_fraction),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.default_ttl, Some(Duration::from_secs(3600)));
        assert!(config.directory.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut invalid = CacheConfig::in_memory();
        invalid.max_size = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = CacheConfig::in_memory();
        invalid.eviction_fraction = 0.0;
        assert!(invalid.validate().is_err());

        let mut invalid = CacheConfig::in_memory();
        invalid.eviction_fraction = 1.5;
        assert!(invalid.validate().is_err());

        let mut invalid = CacheConfig::in_memory();
        invalid.default_ttl = Some(Duration::ZERO);
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .in_memory()
            .max_size(50)
            .default_ttl(Duration::from_secs(600))
            .eviction_fraction(0.25)
            .build();

        assert!(config.directory.is_none());
        assert_eq!(config.max_size, 50);
        assert_eq!(config.default_ttl, Some(Duration::from_secs(600)));
        assert_eq!(config.eviction_fraction, 0.25);

        let forever = CacheConfig::builder().no_default_expiration().build();
        assert_eq!(forever.default_ttl, None);
    }

    #[test]
    fn test_eviction_batch_rounding() {
        let config = CacheConfig::in_memory();
        assert_eq!(config.eviction_batch(1), 1);
        assert_eq!(config.eviction_batch(5), 1);
        assert_eq!(config.eviction_batch(10), 1);
        assert_eq!(config.eviction_batch(11), 2);
        assert_eq!(config.eviction_batch(1001), 101);

        let all = CacheConfig {
            eviction_fraction: 1.0,
            ..CacheConfig::in_memory()
        };
        assert_eq!(all.eviction_batch(7), 7);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
