//! Engine configuration.

use crate::error::{RecordError, RecordResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the record encryption engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of memoized decryptions.
    pub cache_max_size: usize,

    /// Seconds a memoized decryption stays valid without being read.
    pub cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_max_size: 1000,
            cache_ttl_secs: 300, // 5 minutes
        }
    }
}

impl EngineConfig {
    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> RecordResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RecordResult<()> {
        if self.cache_max_size == 0 {
            return Err(RecordError::InvalidConfig(
                "cache_max_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
