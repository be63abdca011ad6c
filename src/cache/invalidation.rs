//! Publishing and applying cache evictions across the fleet.

use super::ResponseCache;
use crate::broadcast::{BroadcastBus, CacheInvalidationNotification};
use crate::error::Result;
#[cfg(feature = "metrics")]
use crate::metrics::SyncMetrics;
use crate::task::BackgroundTask;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Tells peers which response cache keys this host evicted.
#[derive(Clone)]
pub struct CacheInvalidator {
    bus: Arc<dyn BroadcastBus>,
    cache: Arc<dyn ResponseCache>,
    host_name: String,
    channel: String,
}

impl CacheInvalidator {
    /// Publish on `channel` as `host_name`, evicting from `cache`.
    pub fn new(
        bus: Arc<dyn BroadcastBus>,
        cache: Arc<dyn ResponseCache>,
        host_name: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            cache,
            host_name: host_name.into(),
            channel: channel.into(),
        }
    }

    /// Announce that `keys` were evicted here. An empty set publishes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus rejects the message.
    pub async fn publish<I, K>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let message = CacheInvalidationNotification::new(self.host_name.clone(), keys);
        if message.keys.is_empty() {
            return Ok(());
        }

        let count = message.keys.len();
        self.bus.publish(&self.channel, message.to_payload()?).await?;
        tracing::debug!(channel = %self.channel, keys = count, "cache invalidation published");
        Ok(())
    }

    /// Evict `keys` locally, then announce every requested key.
    ///
    /// Peers may hold keys this host never cached, so the announcement is not
    /// narrowed to local hits. Returns the keys removed here.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus rejects the message; the local evictions
    /// stand regardless.
    pub async fn evict<I, K>(&self, keys: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let requested: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let removed: BTreeSet<String> = requested
            .iter()
            .filter(|key| self.cache.remove(key))
            .cloned()
            .collect();

        self.publish(requested).await?;
        Ok(removed)
    }
}

/// Applies evictions announced by peers to this host's response cache.
pub struct CacheInvalidationListener {
    cache: Arc<dyn ResponseCache>,
    host_name: String,
    #[cfg(feature = "metrics")]
    metrics: Option<SyncMetrics>,
}

impl CacheInvalidationListener {
    /// Evict from `cache`, ignoring messages that originate from `host_name`.
    pub fn new(cache: Arc<dyn ResponseCache>, host_name: impl Into<String>) -> Self {
        Self {
            cache,
            host_name: host_name.into(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Count remotely invalidated keys.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Apply one raw message and return how many keys were removed.
    ///
    /// Messages from this host and malformed messages remove nothing.
    pub fn handle_payload(&self, payload: &str) -> usize {
        let message = match CacheInvalidationNotification::from_payload(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed cache invalidation message");
                return 0;
            }
        };

        if message.origin_host == self.host_name {
            return 0;
        }

        let removed = message.keys.iter().filter(|key| self.cache.remove(key)).count();
        tracing::debug!(
            origin = %message.origin_host,
            requested = message.keys.len(),
            removed,
            "applied remote cache invalidation"
        );

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_remote_invalidations(removed as u64);
        }

        removed
    }

    /// Subscribe to `channel` and apply every message until shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    pub async fn spawn(self, bus: &dyn BroadcastBus, channel: &str) -> Result<BackgroundTask> {
        let mut subscription = bus.subscribe(channel).await?;
        tracing::info!(channel, host = %self.host_name, "cache invalidation listener subscribed");

        Ok(BackgroundTask::spawn("cache-invalidation-listener", move |mut shutdown| async move {
            loop {
                if shutdown.is_set() {
                    break;
                }
                tokio::select! {
                    _ = shutdown.wait() => break,
                    payload = subscription.recv() => match payload {
                        Some(payload) => {
                            self.handle_payload(&payload);
                        }
                        None => {
                            tracing::warn!("cache invalidation subscription closed");
                            break;
                        }
                    },
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::LocalBus;
    use crate::cache::MemoryCache;

    fn cache_with(keys: &[&str]) -> Arc<MemoryCache> {
        let cache = Arc::new(MemoryCache::new());
        for key in keys {
            cache.insert((*key).to_string(), b"body".to_vec());
        }
        cache
    }

    #[test]
    fn test_peer_message_removes_keys() {
        let cache = cache_with(&["k1", "k2", "k3"]);
        let listener = CacheInvalidationListener::new(cache.clone(), "host-a");

        let removed =
            listener.handle_payload(r#"{"HostName":"host-b","CacheKeys":["k1","k2","k9"]}"#);

        assert_eq!(removed, 2);
        assert!(!cache.contains("k1"));
        assert!(!cache.contains("k2"));
        assert!(cache.contains("k3"));
    }

    #[test]
    fn test_own_message_is_ignored() {
        let cache = cache_with(&["k1", "k2"]);
        let listener = CacheInvalidationListener::new(cache.clone(), "host-a");

        let removed = listener.handle_payload(r#"{"HostName":"host-a","CacheKeys":["k1","k2"]}"#);

        assert_eq!(removed, 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_malformed_message_is_ignored() {
        let cache = cache_with(&["k1"]);
        let listener = CacheInvalidationListener::new(cache.clone(), "host-a");

        assert_eq!(listener.handle_payload("{not json"), 0);
        assert!(cache.contains("k1"));
    }

    #[tokio::test]
    async fn test_empty_publish_sends_nothing() {
        let bus = LocalBus::new();
        let mut inbox = bus.subscribe("ns/cache").await.unwrap();
        let invalidator =
            CacheInvalidator::new(Arc::new(bus.clone()), cache_with(&[]), "host-a", "ns/cache");

        invalidator.publish(Vec::<String>::new()).await.unwrap();
        invalidator.publish(["k1"]).await.unwrap();

        let first = inbox.recv().await.unwrap();
        let message = CacheInvalidationNotification::from_payload(&first).unwrap();
        assert_eq!(message.keys.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_publishes_every_requested_key() {
        let bus = LocalBus::new();
        let mut inbox = bus.subscribe("ns/cache").await.unwrap();
        let cache = cache_with(&["k1"]);
        let invalidator =
            CacheInvalidator::new(Arc::new(bus.clone()), cache.clone(), "host-a", "ns/cache");

        let removed = invalidator.evict(["k1", "k2"]).await.unwrap();
        assert_eq!(removed.into_iter().collect::<Vec<_>>(), vec!["k1".to_string()]);

        let payload = inbox.recv().await.unwrap();
        let message = CacheInvalidationNotification::from_payload(&payload).unwrap();
        assert_eq!(message.origin_host, "host-a");
        assert_eq!(
            message.keys.into_iter().collect::<Vec<_>>(),
            vec!["k1".to_string(), "k2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_evict_reaches_keys_only_the_peer_holds() {
        let bus = LocalBus::new();
        let local = cache_with(&["k1"]);
        let peer = cache_with(&["k1", "k2"]);
        let invalidator =
            CacheInvalidator::new(Arc::new(bus.clone()), local.clone(), "host-a", "ns/cache");
        let listener = CacheInvalidationListener::new(peer.clone(), "host-b");
        let mut inbox = bus.subscribe("ns/cache").await.unwrap();

        invalidator.evict(["k1", "k2"]).await.unwrap();
        let removed = listener.handle_payload(&inbox.recv().await.unwrap());

        assert_eq!(removed, 2);
        assert!(local.is_empty());
        assert!(peer.is_empty());
    }

    #[tokio::test]
    async fn test_evict_announces_even_without_local_hits() {
        let bus = LocalBus::new();
        let mut inbox = bus.subscribe("ns/cache").await.unwrap();
        let invalidator =
            CacheInvalidator::new(Arc::new(bus.clone()), cache_with(&[]), "host-a", "ns/cache");

        let removed = invalidator.evict(["k7"]).await.unwrap();
        assert!(removed.is_empty());

        let payload = inbox.recv().await.unwrap();
        let message = CacheInvalidationNotification::from_payload(&payload).unwrap();
        assert_eq!(message.keys.into_iter().collect::<Vec<_>>(), vec!["k7".to_string()]);
    }
}
