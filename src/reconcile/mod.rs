//! Startup reconciliation between local state and the snapshot store.
//!
//! Runs once per process before it serves traffic:
//!
//! 1. fetch the store's latest snapshot (failures mean "none");
//! 2. [`decide`] between no-op, self-backup, restore and version skip;
//! 3. apply the operator's staging override, publish it and request a restart;
//! 4. otherwise hand over to the change monitor.

mod agent;
mod decision;
mod engine;
mod restart;
mod staging;
mod version;

pub use agent::SyncAgent;
pub(crate) use agent::log_backup_failure;
pub use decision::{Decision, decide};
pub use engine::{ReconciliationEngine, StartupOutcome};
pub use restart::RestartGuard;
pub use staging::{StagingFile, StagingOverride, StagingSetting};
pub use version::{ConfigVersion, is_applicable};
