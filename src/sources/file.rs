//! File-backed settings layer.

use super::{SettingsSource, priority};
use crate::error::{Result, SyncError};
use config::File;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Settings layer read from a YAML, TOML or JSON file.
///
/// The format follows the file extension. An optional file that does not exist
/// contributes an empty layer, which is how the write-back overlay behaves
/// before the first restore.
///
/// # Examples
///
/// ```rust
/// use fleet_sync::sources::FileSource;
///
/// let base = FileSource::new("config/settings.yaml");
/// let overlay = FileSource::new("state/overlay.json").optional().with_priority(250);
/// ```
pub struct FileSource {
    path: PathBuf,
    priority: i32,
    required: bool,
}

impl FileSource {
    /// Create a required file layer at the base priority.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            priority: priority::BASE_FILE,
            required: true,
        }
    }

    /// Treat a missing file as an empty layer instead of an error.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set the merge priority of this layer.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Path this layer reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_extension(&self) -> Result<()> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                SyncError::Load(format!(
                    "Unable to determine file format for: {}",
                    self.path.display()
                ))
            })?;

        match extension {
            "yaml" | "yml" | "toml" | "json" => Ok(()),
            other => Err(SyncError::Load(format!(
                "Unsupported settings file extension: {}. Supported: .yaml, .yml, .toml, .json",
                other
            ))),
        }
    }
}

impl SettingsSource for FileSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        self.check_extension()?;

        if !self.path.exists() {
            if self.required {
                return Err(SyncError::Load(format!(
                    "Settings file not found: {}",
                    self.path.display()
                )));
            }
            return Ok(HashMap::new());
        }

        let layer = config::Config::builder()
            .add_source(File::from(self.path.clone()).required(true))
            .build()
            .map_err(|e| {
                SyncError::Load(format!("Failed to read {}: {}", self.path.display(), e))
            })?;

        layer
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| {
                SyncError::Deserialization(format!(
                    "Failed to parse {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
