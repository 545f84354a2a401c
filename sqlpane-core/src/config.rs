//! Engine configuration

use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// Rows pulled per fetch when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Target that opens a fresh, non-persistent store instead of a file.
pub const MEMORY_TARGET: &str = ":memory:";

/// Settings shared by the session, its buffer and the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Rows requested by each `fetch_more` call.
    pub batch_size: usize,
    /// Open a transaction before data-modifying statements so that
    /// commit and rollback have something to act on.
    pub implicit_transactions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            implicit_transactions: true,
        }
    }
}

impl EngineConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_implicit_transactions(mut self, enabled: bool) -> Self {
        self.implicit_transactions = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_positive_batch_size_validates(batch_size in 1usize..100_000) {
            let config = EngineConfig::default().with_batch_size(batch_size);
            prop_assert!(config.validate().is_ok());
        }
    }
}
