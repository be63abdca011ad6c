//! Callbacks invoked after settings are hot-applied.

use crate::core::LiveSettings;
use parking_lot::RwLock;
use std::sync::Arc;

type Callback = Arc<dyn Fn(&LiveSettings) + Send + Sync>;

/// Handle for a subscription; dropping it unsubscribes.
pub struct SubscriptionHandle {
    id: usize,
    registry: Arc<RwLock<SubscriberRegistryInner>>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        let id = self.id;
        self.registry.write().subscribers.retain(|(sub_id, _)| *sub_id != id);
    }
}

struct SubscriberRegistryInner {
    subscribers: Vec<(usize, Callback)>,
    next_id: usize,
}

/// Registry of settings change subscribers.
///
/// Callbacks receive the settings that were just applied. They run on the task
/// that performed the hot-apply, after every live singleton was updated, so
/// they should be quick and must not block.
///
/// # Examples
///
/// ```rust
/// use fleet_sync::core::LiveSettings;
/// use fleet_sync::notify::SubscriberRegistry;
///
/// let registry = SubscriberRegistry::new();
///
/// let handle = registry.subscribe(|settings: &LiveSettings| {
///     println!("log level is now {}", settings.log_level);
/// });
///
/// registry.notify_all(&LiveSettings::default());
///
/// // Unsubscribe by dropping the handle
/// drop(handle);
/// assert_eq!(registry.subscriber_count(), 0);
/// ```
#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RwLock<SubscriberRegistryInner>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SubscriberRegistryInner {
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Register `callback`; keep the returned handle alive to stay subscribed.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&LiveSettings) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Arc::new(callback)));

        SubscriptionHandle {
            id,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Call every subscriber, in subscription order, with `settings`.
    pub fn notify_all(&self, settings: &LiveSettings) {
        // Snapshot first so a callback may subscribe or unsubscribe without deadlocking.
        let callbacks: Vec<Callback> = self
            .inner
            .read()
            .subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(settings);
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_notify() {
        let registry = SubscriberRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let _handle = registry.subscribe(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify_all(&LiveSettings::default());
        registry.notify_all(&LiveSettings::default());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_sees_applied_settings() {
        let registry = SubscriberRegistry::new();
        let seen = Arc::new(parking_lot::Mutex::new(None));

        let seen_clone = Arc::clone(&seen);
        let _handle = registry.subscribe(move |settings| {
            *seen_clone.lock() = Some(settings.log_level);
        });

        let mut settings = LiveSettings::default();
        settings.log_level = LogLevel::Debug;
        registry.notify_all(&settings);

        assert_eq!(*seen.lock(), Some(LogLevel::Debug));
    }

    #[test]
    fn test_unsubscribe_on_drop() {
        let registry = SubscriberRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let handle = registry.subscribe(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.subscriber_count(), 1);

        drop(handle);
        assert_eq!(registry.subscriber_count(), 0);

        registry.notify_all(&LiveSettings::default());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clone_shares_subscribers() {
        let registry = SubscriberRegistry::new();
        let registry2 = registry.clone();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let _handle = registry.subscribe(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry2.notify_all(&LiveSettings::default());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
