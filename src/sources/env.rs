//! Environment variable settings layer.

use super::{SettingsSource, priority};
use crate::error::{Result, SyncError};
use config::Environment;
use std::collections::HashMap;

/// Settings layer read from prefixed environment variables.
///
/// Nested keys use `separator`, so with prefix `FLEET` and separator `__`,
/// `FLEET_POOLS__PRIMARY_POOL_SIZE=20` sets `pools.primary_pool_size`.
pub struct EnvSource {
    prefix: String,
    separator: String,
    priority: i32,
}

impl EnvSource {
    /// Create an environment layer at the highest default priority.
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            priority: priority::ENV,
        }
    }

    /// Set the merge priority of this layer.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl SettingsSource for EnvSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        let environment = Environment::with_prefix(&self.prefix)
            .prefix_separator("_")
            .separator(&self.separator)
            .try_parsing(true);

        let layer = config::Config::builder()
            .add_source(environment)
            .build()
            .map_err(|e| SyncError::Load(format!("Failed to read environment: {}", e)))?;

        layer
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| SyncError::Deserialization(format!("Failed to parse environment: {}", e)))
    }

    fn name(&self) -> String {
        format!("env:{}*", self.prefix)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let source = EnvSource::new("FLEET", "__");
        assert_eq!(source.priority(), 300);
        assert_eq!(source.name(), "env:FLEET*");
    }

    #[test]
    fn test_unmatched_prefix_is_empty() {
        let map = EnvSource::new("FLEET_SYNC_TEST_NO_SUCH_PREFIX", "__")
            .load()
            .unwrap();
        assert!(map.is_empty());
    }
}
