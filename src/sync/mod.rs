//! The assembled sync subsystem of one host.

mod builder;

pub use builder::ConfigSyncBuilder;

use crate::broadcast::{BroadcastBus, ConfigChangeNotification};
use crate::cache::CacheInvalidator;
use crate::checksum::Checksum;
use crate::core::{ConfigContext, LiveSettings, LiveState, UpdateGuard, Validate};
use crate::error::Result;
use crate::monitor::{MonitorHandle, MonitorMode};
use crate::notify::SubscriptionHandle;
use crate::options::SyncOptions;
use crate::propagate::{LevelSwitch, SharedApiSettings, SharedCulture, SharedFeatureFlags};
use crate::reconcile::{RestartGuard, StartupOutcome, SyncAgent, log_backup_failure};
use crate::store::ConfigSnapshot;
use crate::task::BackgroundTask;
use std::sync::Arc;

/// A host's running configuration sync.
///
/// Created by [`ConfigSyncBuilder::start`], which has already reconciled with
/// the store by the time it returns.
pub struct ConfigSync {
    options: SyncOptions,
    agent: Arc<SyncAgent>,
    bus: Option<Arc<dyn BroadcastBus>>,
    outcome: StartupOutcome,
    restart: RestartGuard,
    monitor: Option<MonitorHandle>,
    invalidator: Option<CacheInvalidator>,
    cache_listener: Option<BackgroundTask>,
}

impl ConfigSync {
    /// Create a builder.
    pub fn builder(options: SyncOptions) -> ConfigSyncBuilder {
        ConfigSyncBuilder::new(options)
    }

    /// How startup reconciliation ended.
    pub fn outcome(&self) -> &StartupOutcome {
        &self.outcome
    }

    /// The options in use.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// The configuration context.
    pub fn context(&self) -> &Arc<ConfigContext> {
        self.agent.context()
    }

    /// Current live settings.
    pub fn settings(&self) -> LiveSettings {
        self.agent.context().settings()
    }

    /// Checksum of the current live settings.
    pub fn checksum(&self) -> Checksum {
        self.agent.context().current_checksum()
    }

    /// Live culture settings.
    pub fn culture(&self) -> SharedCulture {
        self.agent.propagator().culture()
    }

    /// Live API settings.
    pub fn api_settings(&self) -> SharedApiSettings {
        self.agent.propagator().api_settings()
    }

    /// Live feature flags.
    pub fn feature_flags(&self) -> SharedFeatureFlags {
        self.agent.propagator().feature_flags()
    }

    /// Live log level.
    pub fn level_switch(&self) -> LevelSwitch {
        self.agent.propagator().level_switch()
    }

    /// Call `callback` after every hot-apply; drop the handle to unsubscribe.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&LiveSettings) + Send + Sync + 'static,
    {
        self.agent.propagator().subscribers().subscribe(callback)
    }

    /// Guard the host watches for a requested restart.
    pub fn restart_guard(&self) -> &RestartGuard {
        &self.restart
    }

    /// Delivery mode of the change monitor, if it is running.
    pub fn monitor_mode(&self) -> Option<MonitorMode> {
        self.monitor.as_ref().map(MonitorHandle::mode)
    }

    /// Whether the change monitor is running.
    pub fn is_monitoring(&self) -> bool {
        self.monitor.as_ref().is_some_and(MonitorHandle::is_running)
    }

    /// Evicts cache keys fleet-wide, when cache management is on.
    pub fn cache_invalidator(&self) -> Option<&CacheInvalidator> {
        self.invalidator.as_ref()
    }

    fn apply_edit<F>(&self, guard: &UpdateGuard<'_>, edit: F) -> Result<Arc<LiveState>>
    where
        F: FnOnce(&mut LiveSettings),
    {
        let ctx = self.agent.context();
        let mut settings = ctx.settings();
        edit(&mut settings);
        settings.validate()?;

        let state = ctx.replace_settings(guard, settings)?;
        self.agent.propagator().apply(&state.settings);
        Ok(state)
    }

    /// Change the live settings on this host only.
    ///
    /// The edit is validated, written back to the settings repository and
    /// propagated. Returns the new checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the edited settings fail validation or cannot be
    /// persisted; live state is unchanged in that case.
    pub async fn update_settings<F>(&self, edit: F) -> Result<Checksum>
    where
        F: FnOnce(&mut LiveSettings),
    {
        let guard = self.agent.context().lock().await;
        let state = self.apply_edit(&guard, edit)?;
        Ok(state.checksum.clone())
    }

    /// Change the live settings and publish them to the fleet.
    ///
    /// After the edit is applied locally the snapshot is submitted to the
    /// store and recorded as the last restored checksum. With config
    /// management over a bus, peers are told right away; otherwise they pick
    /// the change up when they next poll. Pass a no-op edit to publish the
    /// current settings as they are.
    ///
    /// # Errors
    ///
    /// Returns an error if the edit is invalid or the store rejects the
    /// submission. A rejected submission leaves the edit in effect locally;
    /// the next startup publishes it.
    pub async fn publish_local_change<F>(&self, edit: F) -> Result<ConfigSnapshot>
    where
        F: FnOnce(&mut LiveSettings),
    {
        let stored = {
            let ctx = self.agent.context();
            let guard = ctx.lock().await;
            self.apply_edit(&guard, edit)?;
            self.agent
                .back_up(&guard, ctx.last_seen_remote())
                .await
                .inspect_err(log_backup_failure)?
        };

        if self.options.config_management_enabled {
            if let Some(bus) = &self.bus {
                let notification = ConfigChangeNotification::new(
                    self.options.host_name.clone(),
                    stored.checksum.clone(),
                );
                let published = match notification.to_payload() {
                    Ok(payload) => bus.publish(&self.options.channels().config(), payload).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = published {
                    tracing::warn!(error = %e, "failed to announce configuration change");
                }
            }
        }

        Ok(stored)
    }

    /// Stop the change monitor and the cache listener.
    pub async fn shutdown(&mut self) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.shutdown().await;
        }
        if let Some(listener) = self.cache_listener.as_mut() {
            listener.shutdown().await;
        }
    }
}
