//! Runtime options of the sync subsystem.

use crate::broadcast::{
    ChannelNames, DEFAULT_CACHE_CHANNEL, DEFAULT_CONFIG_CHANNEL, DEFAULT_NAMESPACE,
};
use crate::core::{SettingsLoader, Validate};
use crate::error::{Result, ValidationError};
use crate::sources::{EnvSource, FileSource, priority};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options controlling how an instance syncs with the fleet.
///
/// Every field has a default, so an empty source yields a usable value.
///
/// # Examples
///
/// ```rust,no_run
/// use fleet_sync::options::SyncOptions;
///
/// # fn example() -> fleet_sync::error::Result<()> {
/// let options = SyncOptions::load(&["config/fleet-sync.yaml"], Some("FLEET_SYNC"))?;
/// println!("syncing namespace {}", options.namespace);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Name this host publishes under; defaults to the OS host name
    pub host_name: String,
    /// Namespace shared by the fleet in the store and on the bus
    pub namespace: String,
    /// Name of the configuration change channel
    pub config_channel: String,
    /// Name of the cache invalidation channel
    pub cache_channel: String,
    /// Announce and receive configuration changes over the bus
    pub config_management_enabled: bool,
    /// Announce and receive cache invalidations over the bus
    pub cache_management_enabled: bool,
    /// Upper bound of a single store request, in seconds
    pub store_timeout_secs: u64,
    /// How long one long-poll may wait for a change, in seconds
    pub long_poll_timeout_secs: u64,
    /// Back-off after a failed poll, in milliseconds
    pub poll_retry_interval_ms: u64,
    /// File holding the last restored checksum
    pub marker_path: PathBuf,
    /// Operator staging override file, if any
    pub staging_path: Option<PathBuf>,
    /// Product recorded on submitted snapshots
    pub product_id: String,
    /// Product version recorded on submitted snapshots
    pub product_version: String,
    /// Application name a staging file must name to be applied
    pub application_name: String,
    /// Submitter recorded on snapshots; defaults to `host_name`
    pub submitted_by: Option<String>,
    /// Config version of the running code
    pub config_version: String,
}

fn default_host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            host_name: default_host_name(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            config_channel: DEFAULT_CONFIG_CHANNEL.to_string(),
            cache_channel: DEFAULT_CACHE_CHANNEL.to_string(),
            config_management_enabled: true,
            cache_management_enabled: true,
            store_timeout_secs: 10,
            long_poll_timeout_secs: 30,
            poll_retry_interval_ms: 5_000,
            marker_path: PathBuf::from("state/last_restored_checksum"),
            staging_path: None,
            product_id: String::new(),
            product_version: String::new(),
            application_name: String::new(),
            submitted_by: None,
            config_version: "3.0".to_string(),
        }
    }
}

impl SyncOptions {
    /// Load options from `files` (later files win) and, when `env_prefix` is
    /// given, `<PREFIX>_<FIELD>` environment variables on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is missing or unreadable, the merged values
    /// do not deserialize, or validation fails.
    pub fn load<P: AsRef<Path>>(files: &[P], env_prefix: Option<&str>) -> Result<Self> {
        let mut loader = SettingsLoader::new();
        for (index, path) in files.iter().enumerate() {
            let layer_priority = priority::BASE_FILE + (index as i32 * 10);
            loader.add_source(Box::new(
                FileSource::new(path.as_ref()).with_priority(layer_priority),
            ));
        }
        if let Some(prefix) = env_prefix {
            loader.add_source(Box::new(EnvSource::new(prefix, "__")));
        }

        let options: Self = if loader.is_empty() {
            Self::default()
        } else {
            loader.load()?
        };
        options.validate()?;
        Ok(options)
    }

    /// Channel names derived from the namespace and channel options.
    pub fn channels(&self) -> ChannelNames {
        ChannelNames {
            namespace: self.namespace.clone(),
            config_channel: self.config_channel.clone(),
            cache_channel: self.cache_channel.clone(),
        }
    }

    /// Upper bound of a single store request.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// How long one long-poll may wait.
    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.long_poll_timeout_secs)
    }

    /// Back-off after a failed poll.
    pub fn poll_retry_interval(&self) -> Duration {
        Duration::from_millis(self.poll_retry_interval_ms)
    }

    /// Submitter recorded on snapshots.
    pub fn submitter(&self) -> &str {
        self.submitted_by.as_deref().unwrap_or(&self.host_name)
    }
}

impl Validate for SyncOptions {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.host_name.trim().is_empty() {
            errors.push(ValidationError::invalid_field("host_name", "must not be empty"));
        }
        if self.namespace.trim().is_empty() {
            errors.push(ValidationError::invalid_field("namespace", "must not be empty"));
        }
        if self.config_channel.trim().is_empty() || self.cache_channel.trim().is_empty() {
            errors.push(ValidationError::custom("channel names must not be empty"));
        }
        if self.store_timeout_secs == 0 {
            errors.push(ValidationError::invalid_field("store_timeout_secs", "must be positive"));
        }
        if self.long_poll_timeout_secs == 0 {
            errors.push(ValidationError::invalid_field(
                "long_poll_timeout_secs",
                "must be positive",
            ));
        }
        if self.config_version.trim().is_empty() {
            errors.push(ValidationError::invalid_field("config_version", "must not be empty"));
        }

        ValidationError::from_list(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let options = SyncOptions::default();
        assert!(!options.host_name.is_empty());
        assert_eq!(options.channels().config(), "fleet-sync/config");
        assert_eq!(options.store_timeout(), Duration::from_secs(10));
        assert_eq!(options.config_version, "3.0");
        assert_eq!(options.submitter(), options.host_name);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync.yaml");
        fs::write(
            &path,
            r#"
host_name: api-01
namespace: billing
config_management_enabled: false
store_timeout_secs: 3
staging_path: /var/lib/api/staging.json
"#,
        )
        .unwrap();

        let options = SyncOptions::load(&[&path], None).unwrap();
        assert_eq!(options.host_name, "api-01");
        assert_eq!(options.channels().cache(), "billing/cache");
        assert!(!options.config_management_enabled);
        assert!(options.cache_management_enabled);
        assert_eq!(options.store_timeout(), Duration::from_secs(3));
        assert_eq!(options.staging_path, Some(PathBuf::from("/var/lib/api/staging.json")));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync.json");
        fs::write(&path, r#"{"namespace": "", "store_timeout_secs": 0}"#).unwrap();

        assert!(SyncOptions::load(&[&path], None).is_err());
    }
}
