//! Fire-and-forget publish/subscribe between the hosts of one fleet.
//!
//! Two channels are used per namespace: `<namespace>/<config-channel>` carries
//! [`ConfigChangeNotification`]s and `<namespace>/<cache-channel>` carries
//! [`CacheInvalidationNotification`]s. Delivery is best effort; a host that
//! misses a message catches up through the snapshot store instead.

mod local;
mod messages;

pub use local::LocalBus;
pub use messages::{CacheInvalidationNotification, ConfigChangeNotification};

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "fleet-sync";

/// Channel for configuration change notifications.
pub const DEFAULT_CONFIG_CHANNEL: &str = "config";

/// Channel for cache invalidation notifications.
pub const DEFAULT_CACHE_CHANNEL: &str = "cache";

/// Contract of the shared broadcast bus.
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    /// Publish `payload` to every current subscriber of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Broadcast`](crate::error::SyncError::Broadcast)
    /// if the bus cannot accept the message.
    async fn publish(&self, channel: &str, payload: String) -> Result<()>;

    /// Start receiving raw payloads published to `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Broadcast`](crate::error::SyncError::Broadcast)
    /// if the subscription cannot be established.
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;
}

/// Receiving end of a channel subscription.
///
/// Dropping it ends the subscription.
pub struct Subscription {
    channel: String,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    /// Wrap a receiver fed by a bus implementation.
    pub fn new(channel: impl Into<String>, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            channel: channel.into(),
            rx,
        }
    }

    /// Channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next payload, or `None` once the bus closed the subscription.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Fully qualified channel names for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelNames {
    /// Namespace shared by every host of the fleet
    pub namespace: String,
    /// Name of the configuration change channel
    pub config_channel: String,
    /// Name of the cache invalidation channel
    pub cache_channel: String,
}

impl ChannelNames {
    /// Channel names under `namespace` with the default channel names.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// `<namespace>/<config-channel>`
    pub fn config(&self) -> String {
        format!("{}/{}", self.namespace, self.config_channel)
    }

    /// `<namespace>/<cache-channel>`
    pub fn cache(&self) -> String {
        format!("{}/{}", self.namespace, self.cache_channel)
    }
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            config_channel: DEFAULT_CONFIG_CHANNEL.to_string(),
            cache_channel: DEFAULT_CACHE_CHANNEL.to_string(),
        }
    }
}
