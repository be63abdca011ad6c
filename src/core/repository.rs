//! Where live settings are read from at startup and written back to.

use crate::core::persist::write_atomic;
use crate::core::{LiveSettings, SettingsLoader};
use crate::error::{Result, SyncError};
use crate::sources::{EnvSource, FileSource, priority};
use parking_lot::Mutex;
use std::path::PathBuf;

/// Contract of the host's settings repository.
///
/// Restores and staging overrides are saved through it so a restarted process
/// builds the same settings it ran with before the restart.
pub trait SettingsRepository: Send + Sync {
    /// Build the settings from local sources.
    ///
    /// # Errors
    ///
    /// Returns an error if a required source is missing or unreadable.
    fn load(&self) -> Result<LiveSettings>;

    /// Persist `settings` so the next [`load`](Self::load) returns them.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be written.
    fn save(&self, settings: &LiveSettings) -> Result<()>;
}

/// Settings layered from base files, a write-back overlay and the environment.
///
/// Base files seed the settings until something is written back. From then on
/// the overlay holds the full settings and the base files are no longer read;
/// environment overrides always apply last.
///
/// # Examples
///
/// ```rust,no_run
/// use fleet_sync::core::{LayeredSettingsRepository, SettingsRepository};
///
/// # fn example() -> fleet_sync::error::Result<()> {
/// let repository = LayeredSettingsRepository::new("state/settings-overlay.json")
///     .with_file("config/settings.yaml")
///     .with_env_overrides("FLEET", "__");
///
/// let settings = repository.load()?;
/// # Ok(())
/// # }
/// ```
pub struct LayeredSettingsRepository {
    base_files: Vec<PathBuf>,
    overlay_path: PathBuf,
    env: Option<(String, String)>,
}

impl LayeredSettingsRepository {
    /// Create a repository whose write-back overlay lives at `overlay_path`.
    pub fn new(overlay_path: impl Into<PathBuf>) -> Self {
        Self {
            base_files: Vec::new(),
            overlay_path: overlay_path.into(),
            env: None,
        }
    }

    /// Add a base settings file; later files override earlier ones.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_files.push(path.into());
        self
    }

    /// Let prefixed environment variables override every other layer.
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env = Some((prefix.to_string(), separator.to_string()));
        self
    }

    fn loader(&self) -> SettingsLoader {
        let mut loader = SettingsLoader::new();

        // The overlay is a complete document; merging base maps under it would
        // resurrect feature flags the written-back settings no longer have.
        if self.overlay_path.exists() {
            loader.add_source(Box::new(
                FileSource::new(&self.overlay_path).with_priority(priority::OVERLAY),
            ));
        } else {
            for (index, path) in self.base_files.iter().enumerate() {
                let layer_priority = priority::BASE_FILE + (index as i32 * 10);
                loader.add_source(Box::new(FileSource::new(path).with_priority(layer_priority)));
            }
        }

        if let Some((prefix, separator)) = &self.env {
            loader.add_source(Box::new(EnvSource::new(prefix.clone(), separator.clone())));
        }

        loader
    }
}

impl SettingsRepository for LayeredSettingsRepository {
    fn load(&self) -> Result<LiveSettings> {
        let loader = self.loader();
        if loader.is_empty() {
            return Ok(LiveSettings::default());
        }
        loader.load()
    }

    fn save(&self, settings: &LiveSettings) -> Result<()> {
        let json = serde_json::to_vec_pretty(settings)
            .map_err(|e| SyncError::Other(format!("Failed to serialize settings overlay: {}", e)))?;
        write_atomic(&self.overlay_path, &json)?;
        tracing::debug!(path = %self.overlay_path.display(), "settings overlay written");
        Ok(())
    }
}

/// Settings held in memory, for tests and embedded use.
pub struct MemorySettingsRepository {
    settings: Mutex<LiveSettings>,
    saves: Mutex<usize>,
}

impl MemorySettingsRepository {
    /// Start with `settings`.
    pub fn new(settings: LiveSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            saves: Mutex::new(0),
        }
    }

    /// Number of saves so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl SettingsRepository for MemorySettingsRepository {
    fn load(&self) -> Result<LiveSettings> {
        Ok(self.settings.lock().clone())
    }

    fn save(&self, settings: &LiveSettings) -> Result<()> {
        *self.settings.lock() = settings.clone();
        *self.saves.lock() += 1;
        Ok(())
    }
}
