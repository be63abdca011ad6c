//! One-shot startup reconciliation.

use super::agent::{SyncAgent, log_backup_failure};
use super::decision::{Decision, decide};
use super::restart::RestartGuard;
use super::staging::StagingOverride;
use crate::checksum::Checksum;
use crate::core::UpdateGuard;
use crate::error::{StoreError, SyncError};
use std::sync::Arc;

/// How startup reconciliation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Local state is settled; start the change monitor.
    MonitorReady {
        /// What was done about the store's latest snapshot
        decision: Decision,
    },
    /// A staging override was published and a host restart was requested; do
    /// not start the change monitor.
    RestartScheduled {
        /// Checksum of the published snapshot
        checksum: Checksum,
    },
    /// The store refused this host's credentials. The host keeps serving its
    /// local settings, but the sync subsystem stays off.
    SyncAborted {
        /// Why the sync flow stopped
        reason: String,
    },
}

impl StartupOutcome {
    /// Whether the change monitor should start.
    pub fn starts_monitor(&self) -> bool {
        matches!(self, Self::MonitorReady { .. })
    }
}

/// Runs the startup state machine once, before the host starts serving.
///
/// Every store call is individually bounded and caught: an unreachable store
/// degrades to "no remote snapshot" and never fails startup.
pub struct ReconciliationEngine {
    agent: Arc<SyncAgent>,
    restart: RestartGuard,
    staging: Option<StagingOverride>,
    application_name: String,
}

impl ReconciliationEngine {
    /// Create an engine that requests restarts through `restart`.
    pub fn new(agent: Arc<SyncAgent>, restart: RestartGuard) -> Self {
        Self {
            agent,
            restart,
            staging: None,
            application_name: String::new(),
        }
    }

    /// Apply `staging` after reconciling with the store.
    pub fn with_staging(mut self, staging: StagingOverride) -> Self {
        self.staging = Some(staging);
        self
    }

    /// Only accept staging files naming `application_name`.
    pub fn with_application_name(mut self, application_name: impl Into<String>) -> Self {
        self.application_name = application_name.into();
        self
    }

    /// Reconcile local state with the store and apply any staging override.
    pub async fn run(&self) -> StartupOutcome {
        let ctx = self.agent.context();
        let guard = ctx.lock().await;
        let current = ctx.current_checksum();
        tracing::info!(
            checksum = %current,
            version = %ctx.config_version(),
            "startup reconciliation"
        );

        let remote = match self.agent.fetch_latest().await {
            Ok(remote) => remote,
            Err(e) if e.is_fatal_to_sync() => return Self::abort(e),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "snapshot store unavailable, continuing with local settings"
                );
                None
            }
        };

        let last_restored = match ctx.last_restored_checksum() {
            Ok(marker) => marker,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "could not read last restored checksum, treating as absent"
                );
                None
            }
        };

        let decision = decide(
            &current,
            last_restored.as_ref(),
            remote.as_ref(),
            self.agent.local_version(),
        );
        tracing::info!(
            decision = %decision,
            remote = ?remote.as_ref().map(|s| s.checksum.as_str()),
            last_restored = ?last_restored.as_ref().map(Checksum::as_str),
            "reconciliation decision"
        );

        #[cfg(feature = "metrics")]
        if let Some(metrics) = ctx.metrics() {
            metrics.record_decision(decision.as_str());
        }

        match (decision, remote) {
            (Decision::SelfBackup, Some(remote)) => {
                if let Err(e) = self.agent.back_up(&guard, Some(remote.checksum)).await {
                    if let Some(outcome) = Self::abort_on_credentials(&e) {
                        return outcome;
                    }
                    log_backup_failure(&e);
                }
            }
            (Decision::Restore, Some(remote)) => {
                if let Err(e) = self.agent.restore(&guard, &remote) {
                    tracing::error!(
                        checksum = %remote.checksum,
                        error = %e,
                        "failed to restore snapshot"
                    );
                }
            }
            (Decision::VersionSkip, Some(remote)) => {
                tracing::warn!(
                    checksum = %remote.checksum,
                    remote_version = %remote.config_version,
                    local_version = %self.agent.local_version(),
                    "snapshot needs newer code, keeping local settings"
                );
            }
            _ => {}
        }

        if let Some(outcome) = self.apply_staging(&guard).await {
            return outcome;
        }

        StartupOutcome::MonitorReady { decision }
    }

    async fn apply_staging(&self, guard: &UpdateGuard<'_>) -> Option<StartupOutcome> {
        let staging = self.staging.as_ref()?;
        let ctx = self.agent.context();

        let taken = staging.take(
            &self.application_name,
            self.agent.local_version(),
            &ctx.settings(),
        );
        let next = match taken {
            Ok(Some(next)) => next,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    path = %staging.path().display(),
                    error = %e,
                    "staging override rejected"
                );
                return None;
            }
        };

        match ctx.replace_settings(guard, next) {
            Ok(state) => self.agent.propagator().apply(&state.settings),
            Err(e) => {
                tracing::error!(error = %e, "failed to apply staging override");
                return None;
            }
        }

        match self.agent.back_up(guard, ctx.last_seen_remote()).await {
            Ok(stored) => {
                self.restart.request("staging override published");
                Some(StartupOutcome::RestartScheduled {
                    checksum: stored.checksum,
                })
            }
            Err(e) => {
                if let Some(outcome) = Self::abort_on_credentials(&e) {
                    return Some(outcome);
                }
                log_backup_failure(&e);
                None
            }
        }
    }

    fn abort_on_credentials(error: &SyncError) -> Option<StartupOutcome> {
        match error {
            SyncError::Store(store_error) if store_error.is_fatal_to_sync() => {
                Some(Self::abort(store_error.clone()))
            }
            _ => None,
        }
    }

    fn abort(error: StoreError) -> StartupOutcome {
        tracing::error!(
            error = %error,
            "snapshot store rejected credentials, config sync disabled"
        );
        StartupOutcome::SyncAborted {
            reason: error.to_string(),
        }
    }
}
