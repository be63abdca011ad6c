//! The live settings an instance runs with, and their serialized document form.

use crate::checksum::{Checksum, checksum};
use crate::core::Validate;
use crate::error::{Result, SyncError, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Minimum level of events the host process logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything
    Trace,
    /// Debug and above
    Debug,
    /// Info and above
    Info,
    /// Warnings and errors
    Warn,
    /// Errors only
    #[default]
    Error,
}

impl LogLevel {
    /// Lower-case name as it appears in settings files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "verbose" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" | "information" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "fatal" => Ok(Self::Error),
            other => Err(SyncError::Validation(format!("unknown log level '{}'", other))),
        }
    }
}

/// Default formatting cultures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CultureSettings {
    /// Culture used for formatting dates and numbers
    pub default_culture: String,
    /// Culture used for user-facing text
    pub default_ui_culture: String,
}

impl Default for CultureSettings {
    fn default() -> Self {
        Self {
            default_culture: "en-US".to_string(),
            default_ui_culture: "en-US".to_string(),
        }
    }
}

/// Connection pool sizes for the backing data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Size of the primary data-access connection pool
    pub primary_pool_size: u32,
    /// Size of the session pool
    pub session_pool_size: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            primary_pool_size: 10,
            session_pool_size: 10,
        }
    }
}

/// API profile settings read by request handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Largest accepted attachment upload in bytes
    pub attach_request_max_size: u64,
    /// Page size used for bulk reads
    pub bulk_read_size: u32,
    /// Whether the detailed health check endpoint is served
    pub detailed_health_check_enabled: bool,
    /// Whether the host runs its own legacy configuration backup.
    ///
    /// Synced with the rest of the settings for the host to read. Snapshot
    /// store backups do not consult it.
    pub enable_config_backup: bool,
    /// Whether responses include `Link: rel=self` headers
    pub include_link_self_headers: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            attach_request_max_size: 25 * 1024 * 1024,
            bulk_read_size: 5000,
            detailed_health_check_enabled: false,
            enable_config_backup: true,
            include_link_self_headers: false,
        }
    }
}

/// Everything an instance runs with that can change at runtime.
///
/// Fields missing from a source take their defaults, which is also what lets
/// a snapshot written by an older config version be restored by newer code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Name of the API profile in use
    pub profile_name: String,
    /// Minimum log level
    pub log_level: LogLevel,
    /// Formatting cultures
    pub culture: CultureSettings,
    /// Connection pool sizes
    pub pools: PoolSettings,
    /// API profile settings
    pub api: ApiSettings,
    /// Feature flags, kept sorted so serialization is canonical
    pub feature_flags: BTreeMap<String, bool>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            profile_name: "default".to_string(),
            log_level: LogLevel::default(),
            culture: CultureSettings::default(),
            pools: PoolSettings::default(),
            api: ApiSettings::default(),
            feature_flags: BTreeMap::new(),
        }
    }
}

impl Validate for LiveSettings {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.profile_name.trim().is_empty() {
            errors.push(ValidationError::invalid_field("profile_name", "must not be empty"));
        }
        if self.pools.primary_pool_size == 0 {
            errors.push(ValidationError::invalid_field(
                "pools.primary_pool_size",
                "must be greater than 0",
            ));
        }
        if self.pools.session_pool_size == 0 {
            errors.push(ValidationError::invalid_field(
                "pools.session_pool_size",
                "must be greater than 0",
            ));
        }
        if self.culture.default_culture.trim().is_empty() {
            errors.push(ValidationError::invalid_field(
                "culture.default_culture",
                "must not be empty",
            ));
        }
        if self.culture.default_ui_culture.trim().is_empty() {
            errors.push(ValidationError::invalid_field(
                "culture.default_ui_culture",
                "must not be empty",
            ));
        }

        ValidationError::from_list(errors)
    }
}

/// The serialized form of an instance's configuration: the blob that gets
/// checksummed and stored as a snapshot's `configData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Config version of the code that wrote this document
    pub config_version: String,
    /// The settings themselves
    #[serde(default)]
    pub settings: LiveSettings,
}

impl ConfigDocument {
    /// Pair settings with the running code's config version.
    pub fn new(config_version: impl Into<String>, settings: LiveSettings) -> Self {
        Self {
            config_version: config_version.into(),
            settings,
        }
    }

    /// Canonical JSON blob for this document.
    pub fn to_blob(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SyncError::Other(format!("Failed to serialize settings: {}", e)))
    }

    /// Parse a snapshot's `configData` blob.
    pub fn from_blob(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|e| {
            SyncError::Deserialization(format!("Invalid configuration document: {}", e))
        })
    }

    /// Serialize and checksum in one step.
    pub fn blob_and_checksum(&self) -> Result<(String, Checksum)> {
        let blob = self.to_blob()?;
        let sum = checksum(blob.as_bytes())?;
        Ok((blob, sum))
    }
}
