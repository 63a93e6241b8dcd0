//! Cache configuration.

use std::time::Duration;
use warden_core::ConfigError;

/// Cache sizing and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whole-cache expiry period.
    pub max_age: Duration,
    /// Entry count beyond which the cache clears itself.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(360),
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Reads `WARDEN_CACHE_MAX_AGE_MS` and `WARDEN_CACHE_MAX_ENTRIES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_age = match std::env::var("WARDEN_CACHE_MAX_AGE_MS") {
            Ok(raw) => Duration::from_millis(parse_env("WARDEN_CACHE_MAX_AGE_MS", &raw)?),
            Err(_) => defaults.max_age,
        };
        let max_entries = match std::env::var("WARDEN_CACHE_MAX_ENTRIES") {
            Ok(raw) => parse_env("WARDEN_CACHE_MAX_ENTRIES", &raw)?,
            Err(_) => defaults.max_entries,
        };
        let config = Self {
            max_age,
            max_entries,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the whole-cache expiry period.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the max entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_age.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "max_age".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_entries".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: "not a non-negative integer".to_string(),
    })
}
