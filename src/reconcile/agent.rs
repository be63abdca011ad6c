//! Restore and self-backup, shared by startup reconciliation, the change
//! monitor and local edits.

use super::version::ConfigVersion;
use crate::checksum::Checksum;
use crate::core::{ConfigContext, ConfigDocument, UpdateGuard, Validate};
use crate::error::{Result, StoreError, SyncError};
use crate::options::SyncOptions;
use crate::propagate::Propagator;
use crate::store::{ConfigSnapshot, SnapshotStore, SnapshotSubmission, StoreResult, bounded};
use std::sync::Arc;
use std::time::Duration;

/// Identity stamped on every submitted snapshot.
#[derive(Debug, Clone)]
struct Submitter {
    namespace: String,
    submitted_by: String,
    product_id: String,
    product_version: String,
}

/// Moves snapshots between the store and this host's live state.
pub struct SyncAgent {
    ctx: Arc<ConfigContext>,
    store: Arc<dyn SnapshotStore>,
    propagator: Propagator,
    submitter: Submitter,
    store_timeout: Duration,
    local_version: ConfigVersion,
}

impl SyncAgent {
    /// Create an agent for `ctx`, identified on the store by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the context's config version does not parse.
    pub fn new(
        ctx: Arc<ConfigContext>,
        store: Arc<dyn SnapshotStore>,
        propagator: Propagator,
        options: &SyncOptions,
    ) -> Result<Self> {
        let local_version = ctx.config_version().parse()?;
        Ok(Self {
            ctx,
            store,
            propagator,
            submitter: Submitter {
                namespace: options.namespace.clone(),
                submitted_by: options.submitter().to_string(),
                product_id: options.product_id.clone(),
                product_version: options.product_version.clone(),
            },
            store_timeout: options.store_timeout(),
            local_version,
        })
    }

    /// The configuration context.
    pub fn context(&self) -> &Arc<ConfigContext> {
        &self.ctx
    }

    /// The snapshot store.
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// The propagator hot-applies go through.
    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    /// Config version of the running code.
    pub fn local_version(&self) -> &ConfigVersion {
        &self.local_version
    }

    /// Bound on a single store request.
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Fetch the latest snapshot within the store timeout and record it as
    /// the last seen remote checksum.
    pub async fn fetch_latest(&self) -> StoreResult<Option<ConfigSnapshot>> {
        let result = self.peek_latest().await;
        if let Ok(Some(snapshot)) = &result {
            self.ctx.set_last_seen_remote(snapshot.checksum.clone());
        }
        result
    }

    /// Fetch the latest snapshot without recording it as seen.
    pub async fn peek_latest(&self) -> StoreResult<Option<ConfigSnapshot>> {
        let result = bounded(self.store_timeout, self.store.get_latest()).await;
        if result.is_err() {
            self.record_store_failure("get_latest");
        }
        result
    }

    /// Submit the current local state as the new latest snapshot and, once the
    /// store accepted it, record it as the last restored checksum.
    ///
    /// # Errors
    ///
    /// Returns the store error when the submission fails; the marker is left
    /// untouched in that case.
    pub async fn back_up(
        &self,
        guard: &UpdateGuard<'_>,
        expected_latest: Option<Checksum>,
    ) -> Result<ConfigSnapshot> {
        let document = self.ctx.document();
        let (config_data, local_checksum) = document.blob_and_checksum()?;

        let submission = SnapshotSubmission {
            namespace: self.submitter.namespace.clone(),
            config_data,
            submitted_by: self.submitter.submitted_by.clone(),
            config_version: document.config_version.clone(),
            product_id: self.submitter.product_id.clone(),
            product_version: self.submitter.product_version.clone(),
            expected_latest,
        };

        let posted = bounded(self.store_timeout, self.store.post_configuration(submission)).await;
        let stored = match posted {
            Ok(stored) => stored,
            Err(e) => {
                self.record_store_failure("post_configuration");
                return Err(e.into());
            }
        };

        if stored.checksum != local_checksum {
            tracing::warn!(
                local = %local_checksum,
                stored = %stored.checksum,
                "store assigned a different checksum than computed locally"
            );
        }

        self.ctx.record_restored(guard, &local_checksum)?;
        self.ctx.set_last_seen_remote(stored.checksum.clone());
        tracing::info!(checksum = %local_checksum, "local configuration backed up to the store");

        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.ctx.metrics() {
            metrics.record_self_backup();
        }

        Ok(stored)
    }

    /// Overwrite the live settings from `snapshot`, record its checksum and
    /// propagate the result.
    ///
    /// Returns `false` when the snapshot was already in effect and nothing was
    /// written. Settings are re-stamped with the running config version, so a
    /// snapshot from older code yields a different local checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not parse or validate, or local
    /// state cannot be persisted. Live state is unchanged in that case.
    pub fn restore(&self, guard: &UpdateGuard<'_>, snapshot: &ConfigSnapshot) -> Result<bool> {
        let document = ConfigDocument::from_blob(&snapshot.config_data)?;
        document.settings.validate()?;

        let settings_changed = self.ctx.state().settings != document.settings;
        let marker_changed =
            self.ctx.last_restored_checksum()?.as_ref() != Some(&snapshot.checksum);
        self.ctx.set_last_seen_remote(snapshot.checksum.clone());

        if !settings_changed && !marker_changed {
            tracing::debug!(checksum = %snapshot.checksum, "snapshot already in effect");
            return Ok(false);
        }

        #[cfg(feature = "metrics")]
        let timer = self.ctx.metrics().map(|metrics| metrics.start_hot_apply());

        if settings_changed {
            self.ctx.replace_settings(guard, document.settings.clone())?;
        }
        if marker_changed {
            self.ctx.record_restored(guard, &snapshot.checksum)?;
        }
        if settings_changed {
            self.propagator.apply(&document.settings);
        }

        tracing::info!(
            checksum = %snapshot.checksum,
            remote_version = %snapshot.config_version,
            local_checksum = %self.ctx.current_checksum(),
            "configuration restored from the store"
        );

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (self.ctx.metrics(), timer) {
            metrics.record_restore();
            metrics.record_hot_apply(timer);
        }

        Ok(true)
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_store_failure(&self, operation: &'static str) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.ctx.metrics() {
            metrics.record_store_failure(operation);
        }
    }
}

/// Log a failed back-up the way its cause deserves.
pub(crate) fn log_backup_failure(error: &SyncError) {
    match error {
        SyncError::Store(StoreError::Conflict { expected, actual }) => tracing::warn!(
            expected = ?expected,
            actual = ?actual,
            "another instance published first; waiting for its snapshot"
        ),
        other => tracing::error!(error = %other, "failed to back up local configuration"),
    }
}
