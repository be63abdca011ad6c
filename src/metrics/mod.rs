//! Built-in OpenTelemetry metrics (feature `metrics`).
//!
//! Tracks:
//! - startup reconciliations by decision
//! - restores and self-backups
//! - failed store calls
//! - cache keys removed for peers
//! - hot-apply duration
//!
//! # Examples
//!
//! ```rust,no_run
//! use fleet_sync::metrics::SyncMetrics;
//! use fleet_sync::prelude::*;
//! use opentelemetry::global;
//!
//! # fn example(builder: ConfigSyncBuilder) -> ConfigSyncBuilder {
//! builder.with_metrics(SyncMetrics::new(global::meter("orders-api")))
//! # }
//! ```

mod sync_metrics;

pub use sync_metrics::SyncMetrics;
