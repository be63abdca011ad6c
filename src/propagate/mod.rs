//! Pushing reconciled settings into the live objects the host runs with.
//!
//! The host hands the [`Propagator`] its long-lived handles once at startup.
//! Every restore or hot-apply then writes into those same handles; none of
//! them is ever replaced, so references captured elsewhere stay valid.

mod shared;

pub use shared::{LevelSwitch, Shared, SharedApiSettings, SharedCulture, SharedFeatureFlags};

use crate::core::LiveSettings;
use crate::notify::SubscriberRegistry;
use std::sync::Arc;

/// A connection pool that can change its size at runtime.
pub trait ResizablePool: Send + Sync {
    /// Current size.
    fn size(&self) -> u32;

    /// Grow or shrink to `new_size`.
    fn resize(&self, new_size: u32);
}

/// Writes live settings into the host's singletons and notifies subscribers.
#[derive(Clone)]
pub struct Propagator {
    primary_pool: Option<Arc<dyn ResizablePool>>,
    session_pool: Option<Arc<dyn ResizablePool>>,
    culture: SharedCulture,
    api: SharedApiSettings,
    feature_flags: SharedFeatureFlags,
    log_level: LevelSwitch,
    subscribers: SubscriberRegistry,
}

impl Propagator {
    /// Create a propagator whose handles start from `settings`.
    pub fn new(settings: &LiveSettings) -> Self {
        Self {
            primary_pool: None,
            session_pool: None,
            culture: SharedCulture::new(settings.culture.clone()),
            api: SharedApiSettings::new(settings.api.clone()),
            feature_flags: SharedFeatureFlags::new(settings.feature_flags.clone()),
            log_level: LevelSwitch::new(settings.log_level),
            subscribers: SubscriberRegistry::new(),
        }
    }

    /// Resize `pool` when the primary pool size changes.
    pub fn with_primary_pool(mut self, pool: Arc<dyn ResizablePool>) -> Self {
        self.primary_pool = Some(pool);
        self
    }

    /// Resize `pool` when the session pool size changes.
    pub fn with_session_pool(mut self, pool: Arc<dyn ResizablePool>) -> Self {
        self.session_pool = Some(pool);
        self
    }

    /// Drive `switch` instead of the propagator's own level switch.
    pub fn with_level_switch(mut self, switch: LevelSwitch) -> Self {
        self.log_level = switch;
        self
    }

    /// Live culture settings.
    pub fn culture(&self) -> SharedCulture {
        self.culture.clone()
    }

    /// Live API settings.
    pub fn api_settings(&self) -> SharedApiSettings {
        self.api.clone()
    }

    /// Live feature flags.
    pub fn feature_flags(&self) -> SharedFeatureFlags {
        self.feature_flags.clone()
    }

    /// Live log level.
    pub fn level_switch(&self) -> LevelSwitch {
        self.log_level.clone()
    }

    /// Registry notified after each [`apply`](Self::apply).
    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    /// Write `settings` into every live handle without notifying subscribers.
    ///
    /// Returns the names of the areas that changed.
    pub fn update_singletons(&self, settings: &LiveSettings) -> Vec<&'static str> {
        let mut changed = Vec::new();

        if resize(self.primary_pool.as_deref(), settings.pools.primary_pool_size) {
            changed.push("primary_pool");
        }
        if resize(self.session_pool.as_deref(), settings.pools.session_pool_size) {
            changed.push("session_pool");
        }
        if self.culture.set(settings.culture.clone()) {
            changed.push("culture");
        }
        if self.log_level.set(settings.log_level) {
            changed.push("log_level");
        }
        if self.api.set(settings.api.clone()) {
            changed.push("api");
        }
        if self.feature_flags.set(settings.feature_flags.clone()) {
            changed.push("feature_flags");
        }

        changed
    }

    /// Propagate freshly reconciled settings, then notify subscribers.
    pub fn apply(&self, settings: &LiveSettings) {
        let changed = self.update_singletons(settings);
        tracing::info!(changed = ?changed, profile = %settings.profile_name, "settings propagated");
        self.subscribers.notify_all(settings);
    }
}

fn resize(pool: Option<&dyn ResizablePool>, size: u32) -> bool {
    match pool {
        Some(pool) if pool.size() != size => {
            tracing::debug!(from = pool.size(), to = size, "resizing pool");
            pool.resize(size);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockPool {
        size: Mutex<u32>,
        resizes: AtomicUsize,
    }

    impl MockPool {
        fn new(size: u32) -> Arc<Self> {
            Arc::new(Self {
                size: Mutex::new(size),
                resizes: AtomicUsize::new(0),
            })
        }
    }

    impl ResizablePool for MockPool {
        fn size(&self) -> u32 {
            *self.size.lock()
        }

        fn resize(&self, new_size: u32) {
            *self.size.lock() = new_size;
            self.resizes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_apply_updates_handles_in_place() {
        let settings = LiveSettings::default();
        let primary = MockPool::new(settings.pools.primary_pool_size);
        let session = MockPool::new(settings.pools.session_pool_size);
        let propagator = Propagator::new(&settings)
            .with_primary_pool(primary.clone())
            .with_session_pool(session.clone());

        let culture = propagator.culture();
        let flags = propagator.feature_flags();

        let mut next = settings.clone();
        next.pools.primary_pool_size = 25;
        next.culture.default_culture = "de-DE".into();
        next.log_level = LogLevel::Info;
        next.feature_flags.insert("bulk-export".into(), true);
        propagator.apply(&next);

        assert_eq!(primary.size(), 25);
        assert_eq!(primary.resizes.load(Ordering::SeqCst), 1);
        assert_eq!(session.resizes.load(Ordering::SeqCst), 0);
        assert_eq!(culture.get().default_culture, "de-DE");
        assert!(flags.is_enabled("bulk-export"));
        assert_eq!(propagator.level_switch().level(), LogLevel::Info);
        assert!(culture.ptr_eq(&propagator.culture()));
    }

    #[test]
    fn test_unchanged_settings_touch_nothing() {
        let settings = LiveSettings::default();
        let primary = MockPool::new(settings.pools.primary_pool_size);
        let propagator = Propagator::new(&settings).with_primary_pool(primary.clone());

        assert!(propagator.update_singletons(&settings).is_empty());
        assert_eq!(primary.resizes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscribers_notified_after_apply() {
        let settings = LiveSettings::default();
        let propagator = Propagator::new(&settings);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = Arc::clone(&calls);
        let _handle = propagator.subscribers().subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        propagator.apply(&settings);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        propagator.update_singletons(&settings);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
