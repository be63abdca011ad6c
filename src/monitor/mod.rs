//! Change delivery after startup.
//!
//! Exactly one mode runs per process:
//!
//! - **broadcast**: peers announce new snapshots on the config channel; this
//!   host fetches and hot-applies the announced one;
//! - **polling**: a background task long-polls the store.
//!
//! Every hot-apply takes the same update lock as startup reconciliation.

mod broadcast;
mod polling;

use crate::broadcast::BroadcastBus;
use crate::error::Result;
use crate::options::SyncOptions;
use crate::reconcile::SyncAgent;
use crate::task::BackgroundTask;
use broadcast::BroadcastHandler;
use polling::Poller;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the change monitor learns about new snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Subscribed to the config change channel
    Broadcast,
    /// Long-polling the snapshot store
    Polling,
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Broadcast => "broadcast",
            Self::Polling => "polling",
        })
    }
}

/// Handle to a running change monitor.
pub struct MonitorHandle {
    mode: MonitorMode,
    task: BackgroundTask,
}

impl MonitorHandle {
    /// The delivery mode in use.
    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    /// Whether the monitor task is still running.
    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Stop the monitor and wait for it to finish.
    pub async fn shutdown(&mut self) {
        self.task.shutdown().await;
    }
}

/// Picks the delivery mode and starts it.
pub struct ChangeMonitor {
    agent: Arc<SyncAgent>,
    bus: Option<Arc<dyn BroadcastBus>>,
    host_name: String,
    channel: String,
    config_management_enabled: bool,
    long_poll_timeout: Duration,
    poll_retry_interval: Duration,
}

impl ChangeMonitor {
    /// Create a monitor configured by `options`.
    pub fn new(agent: Arc<SyncAgent>, options: &SyncOptions) -> Self {
        Self {
            agent,
            bus: None,
            host_name: options.host_name.clone(),
            channel: options.channels().config(),
            config_management_enabled: options.config_management_enabled,
            long_poll_timeout: options.long_poll_timeout(),
            poll_retry_interval: options.poll_retry_interval(),
        }
    }

    /// Make broadcast mode available.
    pub fn with_bus(mut self, bus: Arc<dyn BroadcastBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The mode [`start`](Self::start) will use.
    pub fn mode(&self) -> MonitorMode {
        if self.config_management_enabled && self.bus.is_some() {
            MonitorMode::Broadcast
        } else {
            MonitorMode::Polling
        }
    }

    /// Start delivering changes.
    ///
    /// # Errors
    ///
    /// Returns an error if broadcast mode cannot subscribe to its channel.
    pub async fn start(self) -> Result<MonitorHandle> {
        let mode = self.mode();

        let task = match (mode, &self.bus) {
            (MonitorMode::Broadcast, Some(bus)) => {
                let subscription = bus.subscribe(&self.channel).await?;
                let handler =
                    BroadcastHandler::new(Arc::clone(&self.agent), self.host_name.clone());
                BackgroundTask::spawn("config-change-monitor", move |shutdown| {
                    handler.run(subscription, shutdown)
                })
            }
            _ => {
                let poller = Poller::new(
                    Arc::clone(&self.agent),
                    self.long_poll_timeout,
                    self.poll_retry_interval,
                );
                BackgroundTask::spawn("config-change-poller", move |shutdown| poller.run(shutdown))
            }
        };

        tracing::info!(mode = %mode, host = %self.host_name, "change monitor started");
        Ok(MonitorHandle { mode, task })
    }
}
