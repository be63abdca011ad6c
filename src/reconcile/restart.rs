//! One-shot host restart request.

use std::sync::Arc;
use tokio::sync::watch;

/// Requests a host restart at most once per process lifetime.
///
/// The engine calls [`request`](Self::request); the host awaits
/// [`requested`](Self::requested) and shuts down gracefully so its supervisor
/// starts it again.
#[derive(Clone)]
pub struct RestartGuard {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl RestartGuard {
    /// Create a guard with no pending request.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Ask for a restart. Returns `true` only for the first request.
    pub fn request(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let first = self.tx.send_if_modified(|pending| {
            if pending.is_some() {
                return false;
            }
            *pending = Some(reason.clone());
            true
        });

        if first {
            tracing::warn!(reason = %reason, "host restart requested");
        } else {
            tracing::debug!(reason = %reason, "host restart already requested");
        }
        first
    }

    /// Whether a restart was requested.
    pub fn is_requested(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Reason of the pending request, if any.
    pub fn reason(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Resolve with the reason once a restart is requested.
    pub async fn requested(&self) -> String {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or_default(),
            // The sender lives in `self`, so it cannot be gone while we wait.
            Err(_) => String::new(),
        }
    }
}

impl Default for RestartGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_first_request_wins() {
        let guard = RestartGuard::new();
        assert!(!guard.is_requested());

        assert!(guard.request("staging applied"));
        assert!(!guard.request("again"));
        assert!(!guard.clone().request("from a clone"));

        assert_eq!(guard.reason().as_deref(), Some("staging applied"));
    }

    #[tokio::test]
    async fn test_requested_resolves() {
        let guard = RestartGuard::new();
        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.requested().await })
        };

        guard.request("staging applied");
        assert_eq!(waiter.await.unwrap(), "staging applied");
    }
}
