//! # fleet-sync
//!
//! Configuration synchronization and cache invalidation for a fleet of
//! stateless service instances that share one backing data store.
//!
//! ## Overview
//!
//! Each instance keeps its in-memory settings (pool sizes, feature flags,
//! culture, log level, API profile) consistent with one canonical snapshot in
//! an external configuration store, without a rolling restart for every
//! change:
//!
//! - **Drift detection**: settings are serialized and checksummed; a differing
//!   checksum is drift
//! - **Loop-free merging**: a durable "last restored checksum" tells a local
//!   change (publish it) from a peer's change (restore it)
//! - **Hot-apply or restart**: store changes are applied in place; an
//!   operator's staging override is published and followed by one restart
//! - **Cache invalidation**: evicted response cache keys are broadcast so
//!   peers never serve stale data
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleet_sync::prelude::*;
//! use fleet_sync::broadcast::LocalBus;
//! use fleet_sync::store::HttpSnapshotStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let options = SyncOptions::load(&["config/fleet-sync.yaml"], Some("FLEET_SYNC"))?;
//!
//! let store = HttpSnapshotStore::builder()
//!     .with_base_url("https://config.example.com/api")
//!     .with_namespace(options.namespace.clone())
//!     .with_timeout(options.store_timeout())
//!     .build()?;
//!
//! // Reconciles with the store before returning.
//! let sync = ConfigSync::builder(options)
//!     .with_settings_file("config/settings.yaml")
//!     .with_store(Arc::new(store))
//!     .with_bus(Arc::new(LocalBus::new()))
//!     .start()
//!     .await?;
//!
//! if sync.restart_guard().is_requested() {
//!     return Ok(());
//! }
//!
//! // Lock-free reads.
//! let flags = sync.feature_flags();
//! println!("bulk export enabled: {}", flags.is_enabled("bulk-export"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `http-store` (default): [`store::HttpSnapshotStore`] over `reqwest`
//! - `metrics`: OpenTelemetry metrics in [`metrics`]

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod broadcast;
pub mod cache;
pub mod checksum;
pub mod core;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod options;
pub mod propagate;
pub mod reconcile;
pub mod sources;
pub mod store;
pub mod sync;
pub mod task;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::checksum::Checksum;
    pub use crate::core::{LiveSettings, LogLevel, Validate};
    pub use crate::error::{Result, StoreError, SyncError, ValidationError};
    pub use crate::options::SyncOptions;
    pub use crate::reconcile::{RestartGuard, StartupOutcome};
    pub use crate::sync::{ConfigSync, ConfigSyncBuilder};
}
