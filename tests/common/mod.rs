//! Helpers shared by the integration tests.

#![allow(dead_code)]

use fleet_sync::checksum::Checksum;
use fleet_sync::core::{ConfigDocument, LiveSettings, MemoryMarkerStore, MemorySettingsRepository};
use fleet_sync::options::SyncOptions;
use fleet_sync::propagate::ResizablePool;
use fleet_sync::store::InMemorySnapshotStore;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const NAMESPACE: &str = "fleet-sync";

/// Route library logs to the test output; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Options for a host named `host_name` with short poll intervals.
pub fn options(host_name: &str) -> SyncOptions {
    init_tracing();
    SyncOptions {
        host_name: host_name.to_string(),
        namespace: NAMESPACE.to_string(),
        long_poll_timeout_secs: 1,
        poll_retry_interval_ms: 20,
        store_timeout_secs: 2,
        application_name: "orders-api".to_string(),
        ..SyncOptions::default()
    }
}

/// Default settings with the given primary pool size.
pub fn settings(primary_pool_size: u32) -> LiveSettings {
    let mut settings = LiveSettings::default();
    settings.pools.primary_pool_size = primary_pool_size;
    settings
}

/// Blob and checksum of `settings` as written by config version `version`.
pub fn document(settings: &LiveSettings, version: &str) -> (String, Checksum) {
    ConfigDocument::new(version, settings.clone())
        .blob_and_checksum()
        .unwrap()
}

/// One host's local state.
pub struct Host {
    pub repository: Arc<MemorySettingsRepository>,
    pub marker: Arc<MemoryMarkerStore>,
}

impl Host {
    pub fn new(settings: LiveSettings) -> Self {
        Self {
            repository: Arc::new(MemorySettingsRepository::new(settings)),
            marker: Arc::new(MemoryMarkerStore::new()),
        }
    }

    pub fn with_marker(settings: LiveSettings, marker: Checksum) -> Self {
        Self {
            repository: Arc::new(MemorySettingsRepository::new(settings)),
            marker: Arc::new(MemoryMarkerStore::with_value(marker)),
        }
    }
}

pub fn store() -> Arc<InMemorySnapshotStore> {
    Arc::new(InMemorySnapshotStore::new(NAMESPACE))
}

/// Pool that records every resize.
#[derive(Default)]
pub struct RecordingPool {
    size: Mutex<u32>,
    resizes: Mutex<Vec<u32>>,
}

impl RecordingPool {
    pub fn with_size(size: u32) -> Self {
        Self {
            size: Mutex::new(size),
            resizes: Mutex::new(Vec::new()),
        }
    }

    pub fn resizes(&self) -> Vec<u32> {
        self.resizes.lock().clone()
    }
}

impl ResizablePool for RecordingPool {
    fn size(&self) -> u32 {
        *self.size.lock()
    }

    fn resize(&self, new_size: u32) {
        *self.size.lock() = new_size;
        self.resizes.lock().push(new_size);
    }
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn eventually<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Await `future` with a generous upper bound.
pub async fn bounded<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("test step timed out")
}
