//! Operator-provided staging override file.
//!
//! An operator drops a JSON file next to the instance to change individual
//! settings on the next start:
//!
//! ```json
//! {
//!   "ApplicationName": "orders-api",
//!   "MinimumConfigVersion": "3.0",
//!   "UpdateSettings": [
//!     { "SettingName": "log level", "SettingValue": "debug" },
//!     { "SettingName": "feature flag:bulk-export", "SettingValue": "true" }
//!   ]
//! }
//! ```
//!
//! The file is read once and then archived, whether or not it applied, so it
//! is never applied twice.

use super::version::ConfigVersion;
use crate::core::{LiveSettings, LogLevel};
use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const FEATURE_FLAG_PREFIX: &str = "feature flag:";

/// Parsed staging file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StagingFile {
    /// Application the file is meant for
    #[serde(default)]
    pub application_name: String,
    /// Oldest config version the file may be applied to
    #[serde(default)]
    pub minimum_config_version: Option<String>,
    /// Settings to change
    #[serde(default)]
    pub update_settings: Vec<StagingSetting>,
}

/// One setting change from a staging file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StagingSetting {
    /// Human-readable setting name, matched case-insensitively
    pub setting_name: String,
    /// New value as text
    pub setting_value: String,
}

impl StagingFile {
    /// Parse a staging file's contents.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Staging`] for malformed JSON.
    pub fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| SyncError::Staging(format!("Malformed staging file: {}", e)))
    }

    /// Check the file targets this application and this config version.
    ///
    /// An empty `application_name` accepts any file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Staging`] when the file is meant for another
    /// application or needs newer code.
    pub fn check(&self, application_name: &str, running: &ConfigVersion) -> Result<()> {
        if !application_name.is_empty()
            && !self.application_name.trim().eq_ignore_ascii_case(application_name)
        {
            return Err(SyncError::Staging(format!(
                "staging file is for '{}', not '{}'",
                self.application_name, application_name
            )));
        }

        if let Some(minimum) = &self.minimum_config_version {
            let minimum: ConfigVersion = minimum
                .parse()
                .map_err(|e| SyncError::Staging(format!("invalid MinimumConfigVersion: {}", e)))?;
            if minimum.is_newer_than(running) {
                return Err(SyncError::Staging(format!(
                    "staging file needs config version {} but {} is running",
                    minimum, running
                )));
            }
        }

        Ok(())
    }

    /// Apply every recognised setting to `settings`; returns how many changed.
    ///
    /// Unknown names and invalid values are logged and skipped.
    pub fn apply_to(&self, settings: &mut LiveSettings) -> usize {
        let mut changed = 0;
        for setting in &self.update_settings {
            match apply_setting(settings, &setting.setting_name, &setting.setting_value) {
                Ok(true) => {
                    tracing::info!(setting = %setting.setting_name, "staging override applied");
                    changed += 1;
                }
                Ok(false) => {
                    tracing::debug!(
                        setting = %setting.setting_name,
                        "staging override already in effect"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        setting = %setting.setting_name,
                        error = %e,
                        "staging override skipped"
                    );
                }
            }
        }
        changed
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn positive(name: &str, value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SyncError::Staging(format!(
            "{} must be a positive integer, got '{}'",
            name, value
        ))),
    }
}

fn non_empty(name: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SyncError::Staging(format!("{} must not be empty", name)));
    }
    Ok(value.to_string())
}

fn apply_setting(settings: &mut LiveSettings, name: &str, value: &str) -> Result<bool> {
    let trimmed = name.trim();
    let key = trimmed.to_ascii_lowercase();

    if key.starts_with(FEATURE_FLAG_PREFIX) {
        // Flag names keep their original case.
        let flag = non_empty("feature flag name", &trimmed[FEATURE_FLAG_PREFIX.len()..])?;
        let enabled = value
            .trim()
            .to_ascii_lowercase()
            .parse::<bool>()
            .map_err(|_| {
                SyncError::Staging(format!(
                    "feature flag value must be true or false, got '{}'",
                    value
                ))
            })?;
        let previous = settings.feature_flags.insert(flag, enabled);
        return Ok(previous != Some(enabled));
    }

    let changed = match key.as_str() {
        "log level" => replace(&mut settings.log_level, LogLevel::from_str(value)?),
        "api profile name" => replace(&mut settings.profile_name, non_empty(&key, value)?),
        "default culture" => {
            replace(&mut settings.culture.default_culture, non_empty(&key, value)?)
        }
        "default ui culture" => {
            replace(&mut settings.culture.default_ui_culture, non_empty(&key, value)?)
        }
        "primary pool size" => {
            replace(&mut settings.pools.primary_pool_size, positive(&key, value)?)
        }
        "session pool size" => {
            replace(&mut settings.pools.session_pool_size, positive(&key, value)?)
        }
        "bulk read size" => replace(&mut settings.api.bulk_read_size, positive(&key, value)?),
        _ => return Err(SyncError::Staging(format!("unknown setting '{}'", name))),
    };
    Ok(changed)
}

/// The staging file location and its one-shot processing.
pub struct StagingOverride {
    path: PathBuf,
}

impl StagingOverride {
    /// Use the staging file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the staging file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, check and apply the staging file on top of `current`, then archive it.
    ///
    /// Returns `Ok(None)` when there is no file or it changed nothing, and the
    /// new settings otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is malformed, or is meant
    /// for another application or newer code. The file is archived anyway.
    pub fn take(
        &self,
        application_name: &str,
        running: &ConfigVersion,
        current: &LiveSettings,
    ) -> Result<Option<LiveSettings>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %self.path.display(), "processing staging override file");
        let result = Self::process(&contents, application_name, running, current);
        self.archive();
        result
    }

    fn process(
        contents: &str,
        application_name: &str,
        running: &ConfigVersion,
        current: &LiveSettings,
    ) -> Result<Option<LiveSettings>> {
        let file = StagingFile::parse(contents)?;
        file.check(application_name, running)?;

        let mut next = current.clone();
        if file.apply_to(&mut next) == 0 {
            return Ok(None);
        }
        Ok(Some(next))
    }

    fn archive(&self) {
        let stamp = chrono::Local::now().format("%Y_%m_%d_%H_%M_%S");
        let mut archived = self.path.clone().into_os_string();
        archived.push(format!("_archived_{}", stamp));

        match fs::rename(&self.path, &archived) {
            Ok(()) => tracing::info!(
                to = %Path::new(&archived).display(),
                "staging override file archived"
            ),
            Err(e) => tracing::error!(
                path = %self.path.display(),
                error = %e,
                "failed to archive staging override file"
            ),
        }
    }
}
