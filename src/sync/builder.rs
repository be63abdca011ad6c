//! Builder for wiring and starting [`ConfigSync`].

use super::ConfigSync;
use crate::broadcast::BroadcastBus;
use crate::cache::{CacheInvalidationListener, CacheInvalidator, ResponseCache};
use crate::core::{
    ConfigContext, FileMarkerStore, LayeredSettingsRepository, MarkerStore, SettingsRepository,
    Validate,
};
use crate::error::{Result, SyncError};
#[cfg(feature = "metrics")]
use crate::metrics::SyncMetrics;
use crate::monitor::ChangeMonitor;
use crate::options::SyncOptions;
use crate::propagate::{LevelSwitch, Propagator, ResizablePool};
use crate::reconcile::{ReconciliationEngine, RestartGuard, StagingOverride, SyncAgent};
use crate::store::SnapshotStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Overlay file used when no repository or overlay path is given.
const DEFAULT_OVERLAY_PATH: &str = "state/settings_overlay.json";

/// Builder for [`ConfigSync`].
///
/// # Examples
///
/// ```rust,no_run
/// use fleet_sync::prelude::*;
/// use fleet_sync::broadcast::LocalBus;
/// use fleet_sync::cache::MemoryCache;
/// use fleet_sync::store::InMemorySnapshotStore;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<()> {
/// let options = SyncOptions::load(&["config/fleet-sync.yaml"], Some("FLEET_SYNC"))?;
///
/// let sync = ConfigSync::builder(options)
///     .with_settings_file("config/settings.yaml")
///     .with_env_overrides("APP", "__")
///     .with_store(Arc::new(InMemorySnapshotStore::new("fleet-sync")))
///     .with_bus(Arc::new(LocalBus::new()))
///     .with_cache(Arc::new(MemoryCache::new()))
///     .start()
///     .await?;
///
/// if sync.restart_guard().is_requested() {
///     // Shut down gracefully and let the supervisor start us again.
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConfigSyncBuilder {
    options: SyncOptions,
    settings_files: Vec<PathBuf>,
    overlay_path: Option<PathBuf>,
    env: Option<(String, String)>,
    repository: Option<Arc<dyn SettingsRepository>>,
    marker: Option<Arc<dyn MarkerStore>>,
    store: Option<Arc<dyn SnapshotStore>>,
    bus: Option<Arc<dyn BroadcastBus>>,
    cache: Option<Arc<dyn ResponseCache>>,
    primary_pool: Option<Arc<dyn ResizablePool>>,
    session_pool: Option<Arc<dyn ResizablePool>>,
    level_switch: Option<LevelSwitch>,
    restart: RestartGuard,
    #[cfg(feature = "metrics")]
    metrics: Option<SyncMetrics>,
}

impl ConfigSyncBuilder {
    /// Create a builder for `options`.
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            settings_files: Vec::new(),
            overlay_path: None,
            env: None,
            repository: None,
            marker: None,
            store: None,
            bus: None,
            cache: None,
            primary_pool: None,
            session_pool: None,
            level_switch: None,
            restart: RestartGuard::new(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Add a base settings file (YAML, TOML or JSON); later files win.
    pub fn with_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_files.push(path.into());
        self
    }

    /// Where restored and staged settings are written back.
    pub fn with_overlay_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.overlay_path = Some(path.into());
        self
    }

    /// Let prefixed environment variables override the settings files.
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env = Some((prefix.to_string(), separator.to_string()));
        self
    }

    /// Use a custom settings repository instead of files.
    pub fn with_repository(mut self, repository: Arc<dyn SettingsRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Use a custom marker store instead of `options.marker_path`.
    pub fn with_marker_store(mut self, marker: Arc<dyn MarkerStore>) -> Self {
        self.marker = Some(marker);
        self
    }

    /// The snapshot store; required.
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The broadcast bus; without one the monitor polls and caches are not
    /// invalidated across hosts.
    pub fn with_bus(mut self, bus: Arc<dyn BroadcastBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The host's response cache.
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resize `pool` when `pools.primary_pool_size` changes.
    pub fn with_primary_pool(mut self, pool: Arc<dyn ResizablePool>) -> Self {
        self.primary_pool = Some(pool);
        self
    }

    /// Resize `pool` when `pools.session_pool_size` changes.
    pub fn with_session_pool(mut self, pool: Arc<dyn ResizablePool>) -> Self {
        self.session_pool = Some(pool);
        self
    }

    /// Drive the host's log level through `switch`.
    pub fn with_level_switch(mut self, switch: LevelSwitch) -> Self {
        self.level_switch = Some(switch);
        self
    }

    /// Share a restart guard with the host.
    pub fn with_restart_guard(mut self, restart: RestartGuard) -> Self {
        self.restart = restart;
        self
    }

    /// Record metrics on `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn repository(&mut self) -> Arc<dyn SettingsRepository> {
        if let Some(repository) = self.repository.take() {
            return repository;
        }

        let overlay = self
            .overlay_path
            .take()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OVERLAY_PATH));
        let mut repository = LayeredSettingsRepository::new(overlay);
        for path in self.settings_files.drain(..) {
            repository = repository.with_file(path);
        }
        if let Some((prefix, separator)) = self.env.take() {
            repository = repository.with_env_overrides(&prefix, &separator);
        }
        Arc::new(repository)
    }

    /// Load local settings, reconcile with the store, and start the change
    /// monitor and cache listener.
    ///
    /// Store and bus failures never fail startup; they are logged and the
    /// instance runs on its local settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, no store was given, or
    /// local settings cannot be loaded.
    pub async fn start(mut self) -> Result<ConfigSync> {
        self.options.validate()?;
        let store = self
            .store
            .take()
            .ok_or_else(|| SyncError::Other("A snapshot store is required".to_string()))?;

        let repository = self.repository();
        let marker_path = self.options.marker_path.clone();
        let marker = self
            .marker
            .take()
            .unwrap_or_else(|| Arc::new(FileMarkerStore::new(marker_path)) as Arc<dyn MarkerStore>);

        let ctx = ConfigContext::load(self.options.config_version.clone(), repository, marker)?;
        #[cfg(feature = "metrics")]
        let ctx = match self.metrics.clone() {
            Some(metrics) => ctx.with_metrics(metrics),
            None => ctx,
        };
        let ctx = Arc::new(ctx);

        let settings = ctx.settings();
        let mut propagator = Propagator::new(&settings);
        if let Some(pool) = self.primary_pool.take() {
            propagator = propagator.with_primary_pool(pool);
        }
        if let Some(pool) = self.session_pool.take() {
            propagator = propagator.with_session_pool(pool);
        }
        if let Some(switch) = self.level_switch.take() {
            propagator = propagator.with_level_switch(switch);
        }
        propagator.update_singletons(&settings);

        let agent = Arc::new(SyncAgent::new(
            Arc::clone(&ctx),
            store,
            propagator,
            &self.options,
        )?);

        let channels = self.options.channels();
        let (invalidator, cache_listener) = match (&self.bus, &self.cache) {
            (Some(bus), Some(cache)) if self.options.cache_management_enabled => {
                let invalidator = CacheInvalidator::new(
                    Arc::clone(bus),
                    Arc::clone(cache),
                    self.options.host_name.clone(),
                    channels.cache(),
                );
                let host_name = self.options.host_name.clone();
                let listener = CacheInvalidationListener::new(Arc::clone(cache), host_name);
                #[cfg(feature = "metrics")]
                let listener = match self.metrics.clone() {
                    Some(metrics) => listener.with_metrics(metrics),
                    None => listener,
                };
                let task = match listener.spawn(bus.as_ref(), &channels.cache()).await {
                    Ok(task) => Some(task),
                    Err(e) => {
                        tracing::error!(error = %e, "cache invalidation listener not started");
                        None
                    }
                };
                (Some(invalidator), task)
            }
            _ => (None, None),
        };

        let mut engine = ReconciliationEngine::new(Arc::clone(&agent), self.restart.clone())
            .with_application_name(self.options.application_name.clone());
        if let Some(path) = &self.options.staging_path {
            engine = engine.with_staging(StagingOverride::new(path));
        }
        let outcome = engine.run().await;

        let monitor = if outcome.starts_monitor() {
            let mut monitor = ChangeMonitor::new(Arc::clone(&agent), &self.options);
            if let Some(bus) = &self.bus {
                monitor = monitor.with_bus(Arc::clone(bus));
            }
            match monitor.start().await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "change monitor not started");
                    None
                }
            }
        } else {
            tracing::info!(outcome = ?outcome, "change monitor not started");
            None
        };

        Ok(ConfigSync {
            options: self.options,
            agent,
            bus: self.bus,
            outcome,
            restart: self.restart,
            monitor,
            invalidator,
            cache_listener,
        })
    }
}
