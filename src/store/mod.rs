//! The external configuration snapshot store.
//!
//! The store holds one "latest" snapshot per namespace. Instances read it at
//! startup, back themselves up into it, and long-poll it for changes when no
//! broadcast bus is available.

#[cfg(feature = "http-store")]
mod http;
mod memory;

#[cfg(feature = "http-store")]
pub use http::{HttpAuth, HttpSnapshotStore, HttpSnapshotStoreBuilder};
pub use memory::InMemorySnapshotStore;

use crate::checksum::Checksum;
use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One immutable configuration snapshot as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Namespace the snapshot belongs to
    pub namespace: String,
    /// Opaque serialized configuration document
    pub config_data: String,
    /// Checksum of `config_data`
    pub checksum: Checksum,
    /// Config version of the code that produced the snapshot
    pub config_version: String,
    /// Product that produced the snapshot
    #[serde(default)]
    pub product_id: String,
    /// Version of that product
    #[serde(default)]
    pub product_version: String,
}

/// A request to make `config_data` the namespace's latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSubmission {
    /// Target namespace
    pub namespace: String,
    /// Serialized configuration document
    pub config_data: String,
    /// Who submitted it, usually the host name
    pub submitted_by: String,
    /// Config version of the running code
    pub config_version: String,
    /// Submitting product
    pub product_id: String,
    /// Submitting product's version
    pub product_version: String,
    /// Checksum the submitter last saw as latest; a store that checks it
    /// answers with [`StoreError::Conflict`] when another instance won the race.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_latest: Option<Checksum>,
}

/// Contract of the configuration snapshot store.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Fetch the namespace's latest snapshot, `None` when there is none yet.
    async fn get_latest(&self) -> StoreResult<Option<ConfigSnapshot>>;

    /// Submit a new latest snapshot and return it as stored.
    async fn post_configuration(
        &self,
        submission: SnapshotSubmission,
    ) -> StoreResult<ConfigSnapshot>;

    /// Wait up to `timeout` for the latest snapshot's checksum to differ from
    /// `known`. Returns `None` when nothing changed in that time.
    async fn wait_for_change(
        &self,
        known: &Checksum,
        timeout: Duration,
    ) -> StoreResult<Option<ConfigSnapshot>>;
}

/// Run a store call with a hard upper bound on its duration.
pub async fn bounded<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
