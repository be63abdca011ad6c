//! Settings validation support.

use crate::error::ValidationError;

/// Trait for validating settings before they become live.
///
/// Restored snapshots and staging overrides are validated before they are
/// applied; a failure keeps the current settings.
///
/// # Examples
///
/// ```rust
/// use fleet_sync::core::{LiveSettings, Validate};
///
/// let mut settings = LiveSettings::default();
/// assert!(settings.validate().is_ok());
///
/// settings.pools.session_pool_size = 0;
/// assert!(settings.validate().is_err());
/// ```
pub trait Validate {
    /// Validate the value.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
