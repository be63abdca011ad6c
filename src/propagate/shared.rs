//! Long-lived handles the host reads its live settings through.

use crate::core::{ApiSettings, CultureSettings, LogLevel};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::reload;

/// A value shared between the host and the propagator, updated in place.
///
/// Clones point at the same value; the propagator never swaps the handle
/// itself, so anything the host captured at startup sees every update.
#[derive(Debug, Default)]
pub struct Shared<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq> Shared<T> {
    /// Wrap `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    /// Copy of the current value.
    pub fn get(&self) -> T {
        self.inner.read().clone()
    }

    /// Run `f` with the current value borrowed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.read())
    }

    /// Overwrite the value in place; returns whether it changed.
    pub fn set(&self, value: T) -> bool {
        let mut current = self.inner.write();
        if *current == value {
            return false;
        }
        *current = value;
        true
    }

    /// Whether both handles point at the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Live culture settings.
pub type SharedCulture = Shared<CultureSettings>;

/// Live API settings.
pub type SharedApiSettings = Shared<ApiSettings>;

/// Live feature flags.
pub type SharedFeatureFlags = Shared<BTreeMap<String, bool>>;

impl Shared<BTreeMap<String, bool>> {
    /// Whether `flag` is set; unknown flags are off.
    pub fn is_enabled(&self, flag: &str) -> bool {
        self.inner.read().get(flag).copied().unwrap_or(false)
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

type ReloadFn = Arc<dyn Fn(LevelFilter) -> Result<(), reload::Error> + Send + Sync>;

/// The process log level, changeable at runtime.
///
/// On its own it only records the level. Wire it to the host's subscriber
/// with [`with_reload_handle`](Self::with_reload_handle) so a hot-applied
/// level actually changes what gets logged.
///
/// # Examples
///
/// ```rust
/// use fleet_sync::core::LogLevel;
/// use fleet_sync::propagate::LevelSwitch;
/// use tracing_subscriber::filter::LevelFilter;
/// use tracing_subscriber::{prelude::*, reload};
///
/// let (filter, handle) = reload::Layer::new(LevelFilter::ERROR);
/// let _subscriber = tracing_subscriber::registry().with(filter);
///
/// let switch = LevelSwitch::new(LogLevel::Error).with_reload_handle(handle);
/// switch.set(LogLevel::Debug);
/// assert_eq!(switch.level(), LogLevel::Debug);
/// ```
#[derive(Clone)]
pub struct LevelSwitch {
    level: Arc<RwLock<LogLevel>>,
    reload: Option<ReloadFn>,
}

impl LevelSwitch {
    /// Start at `level`.
    pub fn new(level: LogLevel) -> Self {
        Self {
            level: Arc::new(RwLock::new(level)),
            reload: None,
        }
    }

    /// Forward every change to a `tracing_subscriber` reload handle.
    pub fn with_reload_handle<S>(mut self, handle: reload::Handle<LevelFilter, S>) -> Self
    where
        S: 'static,
    {
        self.reload = Some(Arc::new(move |filter| handle.modify(|current| *current = filter)));
        self
    }

    /// Current level.
    pub fn level(&self) -> LogLevel {
        *self.level.read()
    }

    /// Change the level in place; returns whether it changed.
    pub fn set(&self, level: LogLevel) -> bool {
        {
            let mut current = self.level.write();
            if *current == level {
                return false;
            }
            *current = level;
        }

        if let Some(reload) = &self.reload {
            if let Err(e) = reload(level.into()) {
                tracing::warn!(error = %e, level = %level, "failed to reload log filter");
            }
        }
        true
    }
}

impl Default for LevelSwitch {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_shared_set_reports_change() {
        let culture = SharedCulture::new(CultureSettings::default());
        assert!(!culture.set(CultureSettings::default()));

        let french = CultureSettings {
            default_culture: "fr-FR".into(),
            default_ui_culture: "fr-FR".into(),
        };
        assert!(culture.set(french.clone()));
        assert_eq!(culture.get(), french);
    }

    #[test]
    fn test_clones_observe_updates() {
        let flags = SharedFeatureFlags::default();
        let captured = flags.clone();

        flags.set(BTreeMap::from([("new-search".to_string(), true)]));

        assert!(captured.is_enabled("new-search"));
        assert!(!captured.is_enabled("unknown"));
        assert!(captured.ptr_eq(&flags));
    }

    #[test]
    fn test_level_switch_drives_reload_handle() {
        let (filter, handle) = reload::Layer::new(LevelFilter::ERROR);
        let _subscriber = tracing_subscriber::registry().with(filter);
        let second_handle = handle.clone();

        let switch = LevelSwitch::new(LogLevel::Error).with_reload_handle(handle);
        assert!(switch.set(LogLevel::Debug));
        assert!(!switch.set(LogLevel::Debug));

        assert_eq!(second_handle.clone_current(), Some(LevelFilter::DEBUG));
    }
}
