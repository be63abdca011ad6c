//! Sync metrics over OpenTelemetry.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for reconciliation, hot-apply and cache invalidation.
///
/// # Examples
///
/// ```rust,no_run
/// use fleet_sync::metrics::SyncMetrics;
/// use opentelemetry::global;
///
/// let metrics = SyncMetrics::new(global::meter("fleet-sync"));
///
/// let timer = metrics.start_hot_apply();
/// // ... restore and propagate ...
/// metrics.record_hot_apply(timer);
/// ```
#[derive(Clone)]
pub struct SyncMetrics {
    reconciliations: Counter<u64>,
    restores: Counter<u64>,
    self_backups: Counter<u64>,
    store_failures: Counter<u64>,
    remote_invalidations: Counter<u64>,
    hot_apply_duration: Histogram<f64>,
}

impl SyncMetrics {
    /// Create the instruments on `meter`.
    pub fn new(meter: Meter) -> Self {
        let reconciliations = meter
            .u64_counter("fleet_sync.reconciliations")
            .with_description("Startup reconciliations by decision")
            .build();

        let restores = meter
            .u64_counter("fleet_sync.restores")
            .with_description("Snapshots restored from the store")
            .build();

        let self_backups = meter
            .u64_counter("fleet_sync.self_backups")
            .with_description("Local snapshots submitted to the store")
            .build();

        let store_failures = meter
            .u64_counter("fleet_sync.store.failures")
            .with_description("Failed snapshot store calls by operation")
            .build();

        let remote_invalidations = meter
            .u64_counter("fleet_sync.cache.remote_invalidations")
            .with_description("Cache keys removed on behalf of peers")
            .build();

        let hot_apply_duration = meter
            .f64_histogram("fleet_sync.hot_apply.duration")
            .with_description("Duration of restore-and-propagate operations in seconds")
            .with_unit("s")
            .build();

        Self {
            reconciliations,
            restores,
            self_backups,
            store_failures,
            remote_invalidations,
            hot_apply_duration,
        }
    }

    /// Count one startup reconciliation that took `decision`.
    pub fn record_decision(&self, decision: &'static str) {
        self.reconciliations.add(1, &[KeyValue::new("decision", decision)]);
    }

    /// Count one restored snapshot.
    pub fn record_restore(&self) {
        self.restores.add(1, &[]);
    }

    /// Count one accepted self-backup.
    pub fn record_self_backup(&self) {
        self.self_backups.add(1, &[]);
    }

    /// Count one failed store call.
    pub fn record_store_failure(&self, operation: &'static str) {
        self.store_failures.add(1, &[KeyValue::new("operation", operation)]);
    }

    /// Count keys removed because a peer asked.
    pub fn record_remote_invalidations(&self, keys: u64) {
        if keys > 0 {
            self.remote_invalidations.add(keys, &[]);
        }
    }

    /// Start timing a hot-apply.
    pub fn start_hot_apply(&self) -> Instant {
        Instant::now()
    }

    /// Record the duration of a hot-apply started with [`start_hot_apply`](Self::start_hot_apply).
    pub fn record_hot_apply(&self, start: Instant) {
        self.hot_apply_duration.record(start.elapsed().as_secs_f64(), &[]);
    }
}
