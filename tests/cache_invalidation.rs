//! Fleet-wide response cache invalidation.

mod common;

use common::{Host, bounded, eventually, options, settings, store};
use fleet_sync::broadcast::{BroadcastBus, CacheInvalidationNotification, LocalBus};
use fleet_sync::cache::{MemoryCache, ResponseCache};
use fleet_sync::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn warm_cache(keys: &[&str]) -> Arc<MemoryCache> {
    let cache = Arc::new(MemoryCache::new());
    for key in keys {
        cache.insert(key.to_string(), b"cached".to_vec());
    }
    cache
}

async fn start(bus: &Arc<LocalBus>, cache: &Arc<MemoryCache>, options: SyncOptions) -> ConfigSync {
    let host = Host::new(settings(10));
    bounded(
        ConfigSync::builder(options)
            .with_repository(host.repository.clone())
            .with_marker_store(host.marker.clone())
            .with_store(store())
            .with_bus(bus.clone())
            .with_cache(cache.clone())
            .start(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_eviction_reaches_peer_cache() {
    let bus = Arc::new(LocalBus::new());
    let cache_a = warm_cache(&["orders/1", "orders/2"]);
    let cache_b = warm_cache(&["orders/1", "orders/2", "orders/9"]);

    let mut a = start(&bus, &cache_a, options("host-a")).await;
    let mut b = start(&bus, &cache_b, options("host-b")).await;

    let invalidator = a.cache_invalidator().unwrap();
    let removed = invalidator.evict(["orders/1", "orders/9"]).await.unwrap();

    assert_eq!(removed.into_iter().collect::<Vec<_>>(), vec!["orders/1".to_string()]);
    assert!(!cache_a.contains("orders/1"));
    assert!(eventually(Duration::from_secs(5), || !cache_b.contains("orders/1")).await);
    assert!(eventually(Duration::from_secs(5), || !cache_b.contains("orders/9")).await);
    assert!(cache_a.contains("orders/2"));
    assert!(cache_b.contains("orders/2"));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_own_invalidation_is_ignored() {
    let bus = Arc::new(LocalBus::new());
    let cache = warm_cache(&["orders/1"]);

    let mut sync = start(&bus, &cache, options("host-a")).await;
    let channel = sync.options().channels().cache();

    let own = CacheInvalidationNotification::new("host-a", ["orders/1"]);
    bus.publish(&channel, own.to_payload().unwrap()).await.unwrap();
    bus.publish(&channel, "[not a message]".to_string()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cache.contains("orders/1"));

    let peer = CacheInvalidationNotification::new("host-b", ["orders/1"]);
    bus.publish(&channel, peer.to_payload().unwrap()).await.unwrap();
    assert!(eventually(Duration::from_secs(5), || !cache.contains("orders/1")).await);

    sync.shutdown().await;
}

#[tokio::test]
async fn test_cache_management_disabled() {
    let bus = Arc::new(LocalBus::new());
    let cache = warm_cache(&["orders/1"]);
    let disabled = SyncOptions {
        cache_management_enabled: false,
        ..options("host-a")
    };

    let mut sync = start(&bus, &cache, disabled).await;
    assert!(sync.cache_invalidator().is_none());

    let peer = CacheInvalidationNotification::new("host-b", ["orders/1"]);
    bus.publish(&sync.options().channels().cache(), peer.to_payload().unwrap())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cache.contains("orders/1"));

    sync.shutdown().await;
}
