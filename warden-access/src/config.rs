//! Access point configuration.

use warden_core::ConfigError;

pub const DEFAULT_MAXIMUM_BATCH_SIZE: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfig {
    /// Records per physical write in [`update_batch`](crate::AccessPoint::update_batch).
    pub maximum_batch_size: usize,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            maximum_batch_size: DEFAULT_MAXIMUM_BATCH_SIZE,
        }
    }
}

impl AccessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `WARDEN_MAX_BATCH_SIZE`, falling back to the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = match std::env::var("WARDEN_MAX_BATCH_SIZE") {
            Ok(raw) => Self {
                maximum_batch_size: raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "WARDEN_MAX_BATCH_SIZE".to_string(),
                    value: raw.clone(),
                    reason: "not a non-negative integer".to_string(),
                })?,
            },
            Err(_) => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_maximum_batch_size(mut self, size: usize) -> Self {
        self.maximum_batch_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maximum_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maximum_batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
