//! Settings source trait.

use crate::error::Result;
use std::collections::HashMap;

/// Default priorities for the built-in sources (higher wins).
pub mod priority {
    /// First base settings file; later files step up by 10.
    pub const BASE_FILE: i32 = 100;
    /// Write-back overlay holding restored and staged settings.
    pub const OVERLAY: i32 = 250;
    /// Environment variable overrides.
    pub const ENV: i32 = 300;
}

/// A layer of raw key/value settings.
///
/// Sources are merged by [`SettingsLoader`](crate::core::SettingsLoader) in
/// ascending priority order, so a higher priority layer overrides keys set by
/// lower ones.
pub trait SettingsSource: Send + Sync {
    /// Read this layer as a map of top-level keys to values.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer exists but cannot be read or parsed.
    fn load(&self) -> Result<HashMap<String, config::Value>>;

    /// Human-readable name used in logs and load errors.
    fn name(&self) -> String;

    /// Merge priority of this layer.
    fn priority(&self) -> i32 {
        priority::BASE_FILE
    }
}
