//! Wire messages exchanged over the broadcast bus.

use crate::checksum::Checksum;
use crate::error::{Result, SyncError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// "A peer published a new latest snapshot."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChangeNotification {
    /// Host that published the snapshot
    #[serde(rename = "HostName")]
    pub origin_host: String,
    /// Checksum of the published snapshot
    #[serde(rename = "Checksum")]
    pub checksum: Checksum,
}

/// "A peer evicted these response cache keys."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInvalidationNotification {
    /// Host that evicted the keys
    #[serde(rename = "HostName")]
    pub origin_host: String,
    /// Evicted keys; absent on the wire means none
    #[serde(rename = "CacheKeys", default)]
    pub keys: BTreeSet<String>,
}

impl ConfigChangeNotification {
    /// Create a notification from `origin_host`.
    pub fn new(origin_host: impl Into<String>, checksum: Checksum) -> Self {
        Self {
            origin_host: origin_host.into(),
            checksum,
        }
    }

    /// Serialize for the bus.
    pub fn to_payload(&self) -> Result<String> {
        encode(self)
    }

    /// Parse a payload received from the bus.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Broadcast`] for malformed payloads.
    pub fn from_payload(payload: &str) -> Result<Self> {
        decode(payload)
    }
}

impl CacheInvalidationNotification {
    /// Create a notification from `origin_host`.
    pub fn new<I, K>(origin_host: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            origin_host: origin_host.into(),
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Serialize for the bus.
    pub fn to_payload(&self) -> Result<String> {
        encode(self)
    }

    /// Parse a payload received from the bus.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Broadcast`] for malformed payloads.
    pub fn from_payload(payload: &str) -> Result<Self> {
        decode(payload)
    }
}

fn encode<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message)
        .map_err(|e| SyncError::Broadcast(format!("Failed to encode message: {}", e)))
}

fn decode<T: DeserializeOwned>(payload: &str) -> Result<T> {
    serde_json::from_str(payload)
        .map_err(|e| SyncError::Broadcast(format!("Malformed message: {}", e)))
}
