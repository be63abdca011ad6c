//! Broadcast-mode delivery: react to peers' change notifications.

use crate::broadcast::{ConfigChangeNotification, Subscription};
use crate::checksum::Checksum;
use crate::reconcile::{SyncAgent, is_applicable};
use crate::task::ShutdownSignal;
use std::sync::Arc;

/// Filters inbound notifications and hot-applies the ones that matter.
pub(crate) struct BroadcastHandler {
    agent: Arc<SyncAgent>,
    host_name: String,
}

impl BroadcastHandler {
    pub(crate) fn new(agent: Arc<SyncAgent>, host_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            agent,
            host_name: host_name.into(),
        })
    }

    /// Consume `subscription` until shutdown or until the bus closes it.
    pub(crate) async fn run(
        self: Arc<Self>,
        mut subscription: Subscription,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            if shutdown.is_set() {
                break;
            }
            tokio::select! {
                _ = shutdown.wait() => break,
                payload = subscription.recv() => match payload {
                    Some(payload) => {
                        if let Some(notification) = self.accept(&payload) {
                            let handler = Arc::clone(&self);
                            tokio::spawn(async move { handler.apply(notification.checksum).await });
                        }
                    }
                    None => {
                        tracing::warn!(
                            channel = subscription.channel(),
                            "config change subscription closed"
                        );
                        break;
                    }
                },
            }
        }
    }

    /// Parse and filter one payload; `Some` means it is worth fetching.
    pub(crate) fn accept(&self, payload: &str) -> Option<ConfigChangeNotification> {
        let notification = match ConfigChangeNotification::from_payload(payload) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed config change message");
                return None;
            }
        };

        if notification.origin_host == self.host_name {
            return None;
        }

        if self.agent.context().last_seen_remote().as_ref() == Some(&notification.checksum) {
            tracing::debug!(checksum = %notification.checksum, "config change already seen");
            return None;
        }

        tracing::info!(
            origin = %notification.origin_host,
            checksum = %notification.checksum,
            "peer published a configuration change"
        );
        Some(notification)
    }

    /// Fetch the latest snapshot and hot-apply it if it is the announced one.
    pub(crate) async fn apply(&self, announced: Checksum) {
        let ctx = self.agent.context();
        let guard = ctx.lock().await;

        let latest = match self.agent.peek_latest().await {
            Ok(Some(latest)) => latest,
            Ok(None) => {
                tracing::warn!(checksum = %announced, "announced snapshot not found in the store");
                return;
            }
            Err(e) => {
                tracing::error!(
                    checksum = %announced,
                    error = %e,
                    "failed to fetch announced snapshot"
                );
                return;
            }
        };

        // A newer snapshot stays unseen here; its own announcement applies it.
        if latest.checksum != announced {
            tracing::debug!(
                announced = %announced,
                latest = %latest.checksum,
                "store moved on since the announcement"
            );
            return;
        }
        ctx.set_last_seen_remote(latest.checksum.clone());

        match ctx.last_restored_checksum() {
            Ok(Some(marker)) if marker == latest.checksum => return,
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "could not read last restored checksum"),
        }

        if !is_applicable(&latest.config_version, self.agent.local_version()) {
            tracing::warn!(
                checksum = %latest.checksum,
                remote_version = %latest.config_version,
                "announced snapshot needs newer code, not applied"
            );
            return;
        }

        if let Err(e) = self.agent.restore(&guard, &latest) {
            tracing::error!(
                checksum = %latest.checksum,
                error = %e,
                "failed to hot-apply announced snapshot"
            );
        }
    }
}
