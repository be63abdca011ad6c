//! The per-process configuration context.

use crate::checksum::Checksum;
use crate::core::{ConfigDocument, LiveSettings, MarkerStore, SettingsRepository};
use crate::error::Result;
#[cfg(feature = "metrics")]
use crate::metrics::SyncMetrics;
use arc_swap::ArcSwap;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Live settings paired with the checksum of their serialized document.
///
/// The two are always computed together and swapped together, so a reader can
/// never observe a checksum that does not belong to the settings beside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveState {
    /// The settings in force
    pub settings: LiveSettings,
    /// Checksum of `ConfigDocument { config_version, settings }`
    pub checksum: Checksum,
}

/// Proof that the caller holds the update lock.
///
/// Every mutation of [`ConfigContext`] takes one of these, so restore,
/// self-backup and staging can never interleave within one process.
pub struct UpdateGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Single owned instance of this process's configuration state.
///
/// Request handlers read through [`settings`](Self::settings) without locking;
/// the reconciliation engine, the change monitor and local edits write under
/// [`lock`](Self::lock).
pub struct ConfigContext {
    config_version: String,
    state: ArcSwap<LiveState>,
    repository: Arc<dyn SettingsRepository>,
    marker: Arc<dyn MarkerStore>,
    update_lock: Mutex<()>,
    last_seen_remote: SyncMutex<Option<Checksum>>,
    #[cfg(feature = "metrics")]
    metrics: Option<SyncMetrics>,
}

impl ConfigContext {
    /// Build the context from the repository's current settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read or the settings
    /// cannot be checksummed.
    pub fn load(
        config_version: impl Into<String>,
        repository: Arc<dyn SettingsRepository>,
        marker: Arc<dyn MarkerStore>,
    ) -> Result<Self> {
        let settings = repository.load()?;
        Self::with_settings(config_version, settings, repository, marker)
    }

    /// Build the context from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be checksummed.
    pub fn with_settings(
        config_version: impl Into<String>,
        settings: LiveSettings,
        repository: Arc<dyn SettingsRepository>,
        marker: Arc<dyn MarkerStore>,
    ) -> Result<Self> {
        let config_version = config_version.into();
        let state = Self::compute(&config_version, settings)?;
        Ok(Self {
            config_version,
            state: ArcSwap::from_pointee(state),
            repository,
            marker,
            update_lock: Mutex::new(()),
            last_seen_remote: SyncMutex::new(None),
            #[cfg(feature = "metrics")]
            metrics: None,
        })
    }

    /// Record sync activity on `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Metrics collector, when one was attached.
    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> Option<&SyncMetrics> {
        self.metrics.as_ref()
    }

    fn compute(config_version: &str, settings: LiveSettings) -> Result<LiveState> {
        let document = ConfigDocument::new(config_version, settings);
        let (_, checksum) = document.blob_and_checksum()?;
        Ok(LiveState {
            settings: document.settings,
            checksum,
        })
    }

    /// Config version of the running code.
    pub fn config_version(&self) -> &str {
        &self.config_version
    }

    /// Current settings; lock-free.
    pub fn settings(&self) -> LiveSettings {
        self.state.load().settings.clone()
    }

    /// Current settings and checksum as one consistent pair; lock-free.
    pub fn state(&self) -> Arc<LiveState> {
        self.state.load_full()
    }

    /// Checksum of the settings currently in force.
    pub fn current_checksum(&self) -> Checksum {
        self.state.load().checksum.clone()
    }

    /// The document (and hence snapshot payload) for the current settings.
    pub fn document(&self) -> ConfigDocument {
        ConfigDocument::new(self.config_version.clone(), self.settings())
    }

    /// Read the persisted last restored checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read.
    pub fn last_restored_checksum(&self) -> Result<Option<Checksum>> {
        self.marker.load()
    }

    /// Last remote checksum this process has seen announced or applied.
    pub fn last_seen_remote(&self) -> Option<Checksum> {
        self.last_seen_remote.lock().clone()
    }

    /// Remember `checksum` as the last remote checksum seen.
    pub fn set_last_seen_remote(&self, checksum: Checksum) {
        *self.last_seen_remote.lock() = Some(checksum);
    }

    /// Acquire the update lock.
    pub async fn lock(&self) -> UpdateGuard<'_> {
        UpdateGuard {
            _guard: self.update_lock.lock().await,
        }
    }

    /// Swap in new settings, recomputing the checksum, and write them back to
    /// the repository. Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be checksummed or persisted; in
    /// that case the in-memory state is left unchanged.
    pub fn replace_settings(
        &self,
        _guard: &UpdateGuard<'_>,
        settings: LiveSettings,
    ) -> Result<Arc<LiveState>> {
        let next = Arc::new(Self::compute(&self.config_version, settings)?);
        self.repository.save(&next.settings)?;
        self.state.store(Arc::clone(&next));
        Ok(next)
    }

    /// Persist `checksum` as the last restored checksum.
    ///
    /// Only call this right after a restore or self-backup succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn record_restored(&self, _guard: &UpdateGuard<'_>, checksum: &Checksum) -> Result<()> {
        self.marker.save(checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MemoryMarkerStore, MemorySettingsRepository};

    fn context() -> (ConfigContext, Arc<MemorySettingsRepository>, Arc<MemoryMarkerStore>) {
        let repository = Arc::new(MemorySettingsRepository::new(LiveSettings::default()));
        let marker = Arc::new(MemoryMarkerStore::new());
        let ctx = ConfigContext::load("3.0", repository.clone(), marker.clone()).unwrap();
        (ctx, repository, marker)
    }

    #[tokio::test]
    async fn test_checksum_follows_settings() {
        let (ctx, repository, _) = context();
        let before = ctx.current_checksum();

        let mut settings = ctx.settings();
        settings.pools.primary_pool_size = 42;

        let guard = ctx.lock().await;
        let state = ctx.replace_settings(&guard, settings.clone()).unwrap();
        drop(guard);

        assert_ne!(before, state.checksum);
        assert_eq!(ctx.current_checksum(), state.checksum);
        assert_eq!(ctx.settings(), settings);
        assert_eq!(repository.save_count(), 1);
    }

    #[tokio::test]
    async fn test_same_settings_same_checksum() {
        let (ctx, _, _) = context();
        let before = ctx.current_checksum();

        let guard = ctx.lock().await;
        let state = ctx.replace_settings(&guard, ctx.settings()).unwrap();
        assert_eq!(before, state.checksum);
    }

    #[tokio::test]
    async fn test_marker_written_only_on_record() {
        let (ctx, _, marker) = context();
        assert_eq!(ctx.last_restored_checksum().unwrap(), None);

        let guard = ctx.lock().await;
        ctx.record_restored(&guard, &Checksum::new("c2")).unwrap();
        assert_eq!(ctx.last_restored_checksum().unwrap(), Some(Checksum::new("c2")));
        assert_eq!(marker.write_count(), 1);
    }
}
