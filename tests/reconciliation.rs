//! Startup reconciliation against the snapshot store.

mod common;

use async_trait::async_trait;
use common::{Host, RecordingPool, document, options, settings, store};
use fleet_sync::broadcast::LocalBus;
use fleet_sync::checksum::Checksum;
use fleet_sync::core::{MarkerStore, SettingsRepository};
use fleet_sync::prelude::*;
use fleet_sync::reconcile::Decision;
use fleet_sync::store::{ConfigSnapshot, SnapshotStore, SnapshotSubmission, StoreResult};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn start(host: &Host, store: Arc<dyn SnapshotStore>, options: SyncOptions) -> ConfigSync {
    ConfigSync::builder(options)
        .with_repository(host.repository.clone())
        .with_marker_store(host.marker.clone())
        .with_store(store)
        .start()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_unreachable_store_keeps_local_settings() {
    let host = Host::new(settings(10));
    let (_, local) = document(&settings(10), "3.0");
    let store = store();
    store.fail_with(StoreError::Unavailable("connection refused".into()));

    let mut sync = start(&host, store.clone(), options("host-a")).await;

    assert_eq!(
        sync.outcome(),
        &StartupOutcome::MonitorReady {
            decision: Decision::NoOp
        }
    );
    assert_eq!(sync.checksum(), local);
    assert_eq!(host.marker.write_count(), 0);
    assert_eq!(host.repository.save_count(), 0);
    assert!(store.submissions().is_empty());
    assert!(sync.is_monitoring());

    sync.shutdown().await;
}

#[tokio::test]
async fn test_peer_snapshot_is_restored_and_propagated() {
    let host = Host::with_marker(settings(10), Checksum::new("c0"));
    let store = store();
    let (blob, remote) = document(&settings(20), "3.0");
    store.seed(blob, "3.0").unwrap();

    let pool = Arc::new(RecordingPool::with_size(10));
    let mut sync = ConfigSync::builder(options("host-a"))
        .with_repository(host.repository.clone())
        .with_marker_store(host.marker.clone())
        .with_store(store.clone())
        .with_primary_pool(pool.clone())
        .start()
        .await
        .unwrap();

    assert_eq!(
        sync.outcome(),
        &StartupOutcome::MonitorReady {
            decision: Decision::Restore
        }
    );
    assert_eq!(sync.settings().pools.primary_pool_size, 20);
    assert_eq!(sync.checksum(), remote);
    assert_eq!(host.marker.load().unwrap(), Some(remote));
    assert_eq!(pool.resizes(), vec![20]);

    // Written back so a restart keeps the restored settings.
    assert_eq!(host.repository.load().unwrap().pools.primary_pool_size, 20);
    assert!(store.submissions().is_empty());

    sync.shutdown().await;
}

#[tokio::test]
async fn test_restore_is_idempotent_across_restarts() {
    let host = Host::with_marker(settings(10), Checksum::new("c0"));
    let store = store();
    let (blob, _) = document(&settings(20), "3.0");
    store.seed(blob, "3.0").unwrap();

    let mut first = start(&host, store.clone(), options("host-a")).await;
    first.shutdown().await;
    assert_eq!(host.marker.write_count(), 1);
    assert_eq!(host.repository.save_count(), 1);

    let mut second = start(&host, store.clone(), options("host-a")).await;
    assert_eq!(
        second.outcome(),
        &StartupOutcome::MonitorReady {
            decision: Decision::NoOp
        }
    );
    assert_eq!(host.marker.write_count(), 1);
    assert_eq!(host.repository.save_count(), 1);
    assert!(store.submissions().is_empty());

    second.shutdown().await;
}

#[tokio::test]
async fn test_local_change_after_restore_is_backed_up() {
    // Restored X earlier, then changed locally to Y; the store still has X.
    let store = store();
    let (blob, x) = document(&settings(20), "3.0");
    store.seed(blob, "3.0").unwrap();

    let host = Host::with_marker(settings(25), x.clone());
    let (_, y) = document(&settings(25), "3.0");

    let mut sync = start(&host, store.clone(), options("host-a")).await;

    assert_eq!(
        sync.outcome(),
        &StartupOutcome::MonitorReady {
            decision: Decision::SelfBackup
        }
    );
    // Y is published rather than X restored.
    assert_eq!(sync.settings().pools.primary_pool_size, 25);
    assert_eq!(store.latest().unwrap().checksum, y);
    assert_eq!(host.marker.load().unwrap(), Some(y));

    let submissions = store.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].expected_latest, Some(x));
    assert_eq!(submissions[0].submitted_by, "host-a");
    assert_eq!(submissions[0].config_version, "3.0");

    sync.shutdown().await;
}

#[tokio::test]
async fn test_snapshot_from_newer_code_is_skipped() {
    let host = Host::with_marker(settings(10), Checksum::new("c0"));
    let (_, local) = document(&settings(10), "3.0");
    let store = store();
    let (blob, _) = document(&settings(40), "4.0");
    store.seed(blob, "4.0").unwrap();

    let mut sync = start(&host, store.clone(), options("host-a")).await;

    assert_eq!(
        sync.outcome(),
        &StartupOutcome::MonitorReady {
            decision: Decision::VersionSkip
        }
    );
    assert_eq!(sync.checksum(), local);
    assert_eq!(host.marker.load().unwrap(), Some(Checksum::new("c0")));
    assert!(store.submissions().is_empty());

    sync.shutdown().await;
}

#[tokio::test]
async fn test_snapshot_from_older_code_is_restamped() {
    let host = Host::new(settings(10));
    let store = store();
    let (blob, remote) = document(&settings(15), "2.9");
    store.seed(blob, "2.9").unwrap();

    let mut sync = start(&host, store.clone(), options("host-a")).await;

    assert_eq!(
        sync.outcome(),
        &StartupOutcome::MonitorReady {
            decision: Decision::Restore
        }
    );
    assert_eq!(sync.settings().pools.primary_pool_size, 15);
    assert_ne!(sync.checksum(), remote);
    assert_eq!(sync.checksum(), document(&settings(15), "3.0").1);
    assert_eq!(host.marker.load().unwrap(), Some(remote));

    sync.shutdown().await;
}

#[tokio::test]
async fn test_rejected_credentials_abort_sync() {
    let host = Host::new(settings(10));
    let store = store();
    store.fail_with(StoreError::InvalidCredentials("401 Unauthorized".into()));

    let sync = start(&host, store, options("host-a")).await;

    assert!(matches!(sync.outcome(), StartupOutcome::SyncAborted { .. }));
    assert!(!sync.is_monitoring());
    assert_eq!(sync.monitor_mode(), None);
    assert_eq!(sync.settings().pools.primary_pool_size, 10);
}

#[tokio::test]
async fn test_staging_override_is_published_and_restart_requested() {
    let dir = TempDir::new().unwrap();
    let staging_path = dir.path().join("staging.json");
    fs::write(
        &staging_path,
        r#"{
            "ApplicationName": "orders-api",
            "MinimumConfigVersion": "3.0",
            "UpdateSettings": [
                { "SettingName": "Primary Pool Size", "SettingValue": "30" }
            ]
        }"#,
    )
    .unwrap();

    // Local, marker and store all agree on c2.
    let store = store();
    let (blob, c2) = document(&settings(20), "3.0");
    store.seed(blob, "3.0").unwrap();
    let host = Host::with_marker(settings(20), c2.clone());
    let (_, c3) = document(&settings(30), "3.0");

    let options = SyncOptions {
        staging_path: Some(staging_path.clone()),
        ..options("host-a")
    };
    let sync = start(&host, store.clone(), options.clone()).await;

    assert_eq!(sync.outcome(), &StartupOutcome::RestartScheduled { checksum: c3.clone() });
    assert!(sync.restart_guard().is_requested());
    assert!(sync.restart_guard().reason().is_some());
    assert!(!sync.is_monitoring());

    let submissions = store.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].expected_latest, Some(c2));
    assert_eq!(store.latest().unwrap().checksum, c3);
    assert_eq!(host.marker.load().unwrap(), Some(c3.clone()));

    // Archived, so the restarted process does not apply it again.
    assert!(!staging_path.exists());
    let archived: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("staging.json_archived_"))
        .collect();
    assert_eq!(archived.len(), 1);

    let restarted = start(&host, store.clone(), options).await;
    assert_eq!(
        restarted.outcome(),
        &StartupOutcome::MonitorReady {
            decision: Decision::NoOp
        }
    );
    assert_eq!(restarted.checksum(), c3);
    assert!(!restarted.restart_guard().is_requested());
    assert_eq!(store.submissions().len(), 1);
}

#[tokio::test]
async fn test_staging_for_another_application_is_archived_unapplied() {
    let dir = TempDir::new().unwrap();
    let staging_path = dir.path().join("staging.json");
    fs::write(
        &staging_path,
        r#"{
            "ApplicationName": "billing-api",
            "UpdateSettings": [
                { "SettingName": "log level", "SettingValue": "debug" }
            ]
        }"#,
    )
    .unwrap();

    let host = Host::new(settings(10));
    let store = store();
    let options = SyncOptions {
        staging_path: Some(staging_path.clone()),
        ..options("host-a")
    };

    let mut sync = start(&host, store.clone(), options).await;

    assert!(sync.outcome().starts_monitor());
    assert_eq!(sync.settings().log_level, LogLevel::Error);
    assert!(!sync.restart_guard().is_requested());
    assert!(!staging_path.exists());
    assert!(store.submissions().is_empty());

    sync.shutdown().await;
}

#[tokio::test]
async fn test_stale_publish_conflicts_and_keeps_marker() {
    let store = store();
    let (blob, x) = document(&settings(20), "3.0");
    store.seed(blob, "3.0").unwrap();
    let host = Host::with_marker(settings(20), x.clone());

    // Broadcast mode, so the unannounced write below is not picked up by a poll.
    let mut sync = ConfigSync::builder(options("host-a"))
        .with_repository(host.repository.clone())
        .with_marker_store(host.marker.clone())
        .with_store(store.clone())
        .with_bus(Arc::new(LocalBus::new()))
        .start()
        .await
        .unwrap();
    assert!(sync.outcome().starts_monitor());

    // Another instance wins the race.
    let (other, _) = document(&settings(50), "3.0");
    store.seed(other, "3.0").unwrap();

    let result = sync
        .publish_local_change(|settings| settings.pools.session_pool_size = 4)
        .await;

    assert!(matches!(result, Err(SyncError::Store(StoreError::Conflict { .. }))));
    assert_eq!(host.marker.load().unwrap(), Some(x));
    assert_eq!(sync.settings().pools.session_pool_size, 4);
    assert!(store.submissions().is_empty());

    sync.shutdown().await;
}

struct HangingStore;

#[async_trait]
impl SnapshotStore for HangingStore {
    async fn get_latest(&self) -> StoreResult<Option<ConfigSnapshot>> {
        std::future::pending().await
    }

    async fn post_configuration(
        &self,
        _submission: SnapshotSubmission,
    ) -> StoreResult<ConfigSnapshot> {
        std::future::pending().await
    }

    async fn wait_for_change(
        &self,
        _known: &Checksum,
        _timeout: Duration,
    ) -> StoreResult<Option<ConfigSnapshot>> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_hanging_store_is_bounded() {
    let host = Host::new(settings(10));
    let (_, local) = document(&settings(10), "3.0");

    let mut sync = start(&host, Arc::new(HangingStore), options("host-a")).await;

    assert_eq!(
        sync.outcome(),
        &StartupOutcome::MonitorReady {
            decision: Decision::NoOp
        }
    );
    assert_eq!(sync.checksum(), local);

    sync.shutdown().await;
}
