//! In-process snapshot store.

use super::{ConfigSnapshot, SnapshotStore, SnapshotSubmission, StoreResult};
use crate::checksum::{Checksum, checksum};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::watch;

struct Inner {
    history: Vec<ConfigSnapshot>,
    submissions: Vec<SnapshotSubmission>,
    gets: usize,
    fault: Option<StoreError>,
}

/// Snapshot store kept in memory.
///
/// Assigns checksums the way a real store does, keeps every revision, enforces
/// `expected_latest`, and serves long-polls. Cloning is not supported; share it
/// behind an `Arc` to model one store used by several hosts.
///
/// # Examples
///
/// ```rust
/// use fleet_sync::store::{InMemorySnapshotStore, SnapshotStore};
///
/// # async fn example() {
/// let store = InMemorySnapshotStore::new("fleet");
/// store.seed(r#"{"config_version":"3.0"}"#, "3.0").unwrap();
///
/// let latest = store.get_latest().await.unwrap().unwrap();
/// assert_eq!(latest.config_version, "3.0");
/// # }
/// ```
pub struct InMemorySnapshotStore {
    namespace: String,
    inner: Mutex<Inner>,
    latest_tx: watch::Sender<Option<ConfigSnapshot>>,
}

impl InMemorySnapshotStore {
    /// Create an empty store for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        let (latest_tx, _) = watch::channel(None);
        Self {
            namespace: namespace.into(),
            inner: Mutex::new(Inner {
                history: Vec::new(),
                submissions: Vec::new(),
                gets: 0,
                fault: None,
            }),
            latest_tx,
        }
    }

    /// Make `config_data` the latest snapshot without going through a submission.
    ///
    /// # Errors
    ///
    /// Returns an error if `config_data` is too large to checksum.
    pub fn seed(
        &self,
        config_data: impl Into<String>,
        config_version: impl Into<String>,
    ) -> crate::error::Result<ConfigSnapshot> {
        let config_data = config_data.into();
        let checksum = checksum(config_data.as_bytes())?;
        let snapshot = ConfigSnapshot {
            namespace: self.namespace.clone(),
            config_data,
            checksum,
            config_version: config_version.into(),
            product_id: String::new(),
            product_version: String::new(),
        };
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Fail every following call with `error` until [`heal`](Self::heal).
    pub fn fail_with(&self, error: StoreError) {
        self.inner.lock().fault = Some(error);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.inner.lock().fault = None;
    }

    /// Current latest snapshot, bypassing fault injection.
    pub fn latest(&self) -> Option<ConfigSnapshot> {
        self.inner.lock().history.last().cloned()
    }

    /// Number of revisions stored so far.
    pub fn revision(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Every accepted submission, oldest first.
    pub fn submissions(&self) -> Vec<SnapshotSubmission> {
        self.inner.lock().submissions.clone()
    }

    /// Number of `get_latest` calls served or failed.
    pub fn get_count(&self) -> usize {
        self.inner.lock().gets
    }

    fn check_fault(&self) -> StoreResult<()> {
        match &self.inner.lock().fault {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn publish(&self, snapshot: ConfigSnapshot) {
        self.inner.lock().history.push(snapshot.clone());
        self.latest_tx.send_replace(Some(snapshot));
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get_latest(&self) -> StoreResult<Option<ConfigSnapshot>> {
        self.inner.lock().gets += 1;
        self.check_fault()?;
        Ok(self.latest())
    }

    async fn post_configuration(
        &self,
        submission: SnapshotSubmission,
    ) -> StoreResult<ConfigSnapshot> {
        self.check_fault()?;

        let checksum = checksum(submission.config_data.as_bytes())
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let snapshot = {
            let mut inner = self.inner.lock();
            let actual = inner.history.last().map(|s| s.checksum.clone());

            if let Some(expected) = &submission.expected_latest {
                if actual.as_ref() != Some(expected) {
                    return Err(StoreError::Conflict {
                        expected: Some(expected.to_string()),
                        actual: actual.map(Checksum::into_string),
                    });
                }
            }

            let snapshot = ConfigSnapshot {
                namespace: self.namespace.clone(),
                config_data: submission.config_data.clone(),
                checksum,
                config_version: submission.config_version.clone(),
                product_id: submission.product_id.clone(),
                product_version: submission.product_version.clone(),
            };
            inner.submissions.push(submission);
            inner.history.push(snapshot.clone());
            snapshot
        };

        self.latest_tx.send_replace(Some(snapshot.clone()));
        tracing::debug!(checksum = %snapshot.checksum, "snapshot stored");
        Ok(snapshot)
    }

    async fn wait_for_change(
        &self,
        known: &Checksum,
        timeout: Duration,
    ) -> StoreResult<Option<ConfigSnapshot>> {
        self.check_fault()?;

        let mut rx = self.latest_tx.subscribe();
        let wait = async {
            loop {
                let changed = {
                    let latest = rx.borrow_and_update();
                    latest.as_ref().filter(|s| &s.checksum != known).cloned()
                };
                if changed.is_some() {
                    return changed;
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        };

        Ok(tokio::time::timeout(timeout, wait).await.unwrap_or(None))
    }
}
