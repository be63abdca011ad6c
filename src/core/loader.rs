//! Layered loader that merges settings sources.

use crate::error::{Result, SyncError};
use crate::sources::SettingsSource;
use config::builder::{ConfigBuilder, DefaultState};
use config::ValueKind;
use serde::de::DeserializeOwned;

/// Loads and merges settings from multiple sources.
///
/// Sources are applied in ascending priority, so higher priority layers
/// override keys set by lower ones. The loader is generic over the target so
/// it builds both [`LiveSettings`](crate::core::LiveSettings) and
/// [`SyncOptions`](crate::options::SyncOptions).
pub struct SettingsLoader {
    sources: Vec<Box<dyn SettingsSource>>,
}

impl SettingsLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a source.
    pub fn add_source(&mut self, source: Box<dyn SettingsSource>) {
        self.sources.push(source);
    }

    /// Builder-style [`add_source`](Self::add_source).
    pub fn with_source<S: SettingsSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Whether no source has been added.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Merge every source and deserialize the result.
    ///
    /// # Errors
    ///
    /// Returns an error if no sources were added, any source fails to load, or
    /// the merged values do not deserialize into `T`.
    pub fn load<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        if self.sources.is_empty() {
            return Err(SyncError::Load("No settings sources specified".to_string()));
        }

        let mut builder = config::Config::builder();

        for source in self.sorted() {
            let values = source.load().map_err(|e| {
                SyncError::Load(format!("Failed to load source '{}': {}", source.name(), e))
            })?;

            for (key, value) in values {
                builder = merge_value(builder, key, value).map_err(|e| {
                    SyncError::Load(format!("Failed to merge source '{}': {}", source.name(), e))
                })?;
            }
        }

        let merged = builder
            .build()
            .map_err(|e| SyncError::Load(format!("Failed to build settings: {}", e)))?;

        merged
            .try_deserialize::<T>()
            .map_err(|e| {
                SyncError::Deserialization(format!("Failed to deserialize settings: {}", e))
            })
    }

    /// Source names in merge order.
    pub fn source_names(&self) -> Vec<String> {
        self.sorted().iter().map(|s| s.name()).collect()
    }

    fn sorted(&self) -> Vec<&dyn SettingsSource> {
        let mut sorted: Vec<&dyn SettingsSource> =
            self.sources.iter().map(|s| s.as_ref()).collect();
        sorted.sort_by_key(|s| s.priority());
        sorted
    }
}

/// Set `value` at `key`, descending into tables so nested keys from a higher
/// layer override individual leaves instead of replacing the whole table.
fn merge_value(
    mut builder: ConfigBuilder<DefaultState>,
    key: String,
    value: config::Value,
) -> std::result::Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    match &value.kind {
        ValueKind::Table(table) if !table.is_empty() => {
            for (child, child_value) in table.clone() {
                builder = merge_value(builder, format!("{}.{}", key, child), child_value)?;
            }
            Ok(builder)
        }
        _ => builder.set_override(key, value),
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LiveSettings;
    use std::collections::HashMap;

    struct MockSource {
        name: String,
        priority: i32,
        values: HashMap<String, config::Value>,
    }

    impl MockSource {
        fn new(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                values: HashMap::new(),
            }
        }

        fn with_value(mut self, key: &str, value: impl Into<config::Value>) -> Self {
            self.values.insert(key.to_string(), value.into());
            self
        }
    }

    impl SettingsSource for MockSource {
        fn load(&self) -> Result<HashMap<String, config::Value>> {
            Ok(self.values.clone())
        }

        fn name(&self) -> String {
            self.name.clone()
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    #[test]
    fn test_empty_loader() {
        let result: Result<LiveSettings> = SettingsLoader::new().load();
        assert!(matches!(result, Err(SyncError::Load(_))));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let loader =
            SettingsLoader::new()
                .with_source(MockSource::new("base", 100).with_value("profile_name", "web"));

        let settings: LiveSettings = loader.load().unwrap();
        assert_eq!(settings.profile_name, "web");
        assert_eq!(settings.pools.primary_pool_size, 10);
    }

    #[test]
    fn test_higher_priority_overrides() {
        let loader = SettingsLoader::new()
            .with_source(
                MockSource::new("overlay", 250)
                    .with_value("profile_name", "restored")
                    .with_value("log_level", "debug"),
            )
            .with_source(MockSource::new("base", 100).with_value("profile_name", "web"));

        let settings: LiveSettings = loader.load().unwrap();
        assert_eq!(settings.profile_name, "restored");
        assert_eq!(settings.log_level.as_str(), "debug");
    }

    #[test]
    fn test_nested_keys_merge_per_leaf() {
        let mut base_pools = HashMap::new();
        base_pools.insert("primary_pool_size".to_string(), config::Value::from(4i64));
        base_pools.insert("session_pool_size".to_string(), config::Value::from(6i64));

        let mut env_pools = HashMap::new();
        env_pools.insert("primary_pool_size".to_string(), config::Value::from(20i64));

        let loader = SettingsLoader::new()
            .with_source(MockSource::new("base", 100).with_value("pools", base_pools))
            .with_source(MockSource::new("env", 300).with_value("pools", env_pools));

        let settings: LiveSettings = loader.load().unwrap();
        assert_eq!(settings.pools.primary_pool_size, 20);
        assert_eq!(settings.pools.session_pool_size, 6);
    }

    #[test]
    fn test_source_names_sorted_by_priority() {
        let loader = SettingsLoader::new()
            .with_source(MockSource::new("env", 300))
            .with_source(MockSource::new("base", 100))
            .with_source(MockSource::new("overlay", 250));

        assert_eq!(loader.source_names(), vec!["base", "overlay", "env"]);
    }
}
