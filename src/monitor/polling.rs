//! Polling-mode delivery: long-poll the store for a new latest snapshot.

use crate::reconcile::{SyncAgent, is_applicable};
use crate::store::{ConfigSnapshot, bounded};
use crate::task::ShutdownSignal;
use std::sync::Arc;
use std::time::Duration;

/// Long-polls the store for the process lifetime.
pub(crate) struct Poller {
    agent: Arc<SyncAgent>,
    long_poll_timeout: Duration,
    retry_interval: Duration,
}

impl Poller {
    pub(crate) fn new(
        agent: Arc<SyncAgent>,
        long_poll_timeout: Duration,
        retry_interval: Duration,
    ) -> Self {
        Self {
            agent,
            long_poll_timeout,
            retry_interval,
        }
    }

    pub(crate) async fn run(self, mut shutdown: ShutdownSignal) {
        let ctx = Arc::clone(self.agent.context());
        let limit = self.long_poll_timeout + self.agent.store_timeout();

        loop {
            if shutdown.is_set() {
                break;
            }

            // Wait relative to the last remote snapshot seen, so a snapshot that
            // was skipped or re-stamped locally does not wake us up again.
            let known = ctx.last_seen_remote().unwrap_or_else(|| ctx.current_checksum());
            let store = Arc::clone(self.agent.store());

            let wait = bounded(limit, store.wait_for_change(&known, self.long_poll_timeout));
            let result = tokio::select! {
                _ = shutdown.wait() => break,
                result = wait => result,
            };

            match result {
                Ok(Some(snapshot)) => self.apply(snapshot).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?self.retry_interval, "long-poll failed");
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(self.retry_interval) => {}
                    }
                }
            }
        }
    }

    async fn apply(&self, snapshot: ConfigSnapshot) {
        let ctx = self.agent.context();
        let guard = ctx.lock().await;
        ctx.set_last_seen_remote(snapshot.checksum.clone());

        if snapshot.checksum == ctx.current_checksum() {
            return;
        }

        match ctx.last_restored_checksum() {
            Ok(Some(marker)) if marker == snapshot.checksum => return,
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "could not read last restored checksum"),
        }

        if !is_applicable(&snapshot.config_version, self.agent.local_version()) {
            tracing::warn!(
                checksum = %snapshot.checksum,
                remote_version = %snapshot.config_version,
                "polled snapshot needs newer code, not applied"
            );
            return;
        }

        if let Err(e) = self.agent.restore(&guard, &snapshot) {
            tracing::error!(
                checksum = %snapshot.checksum,
                error = %e,
                "failed to hot-apply polled snapshot"
            );
        }
    }
}
