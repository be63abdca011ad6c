//! In-process broadcast bus.

use super::{BroadcastBus, Subscription};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const DEFAULT_CAPACITY: usize = 256;

struct Hub {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl Hub {
    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

/// Broadcast bus living inside one process.
///
/// Every clone shares the same hub, so handing one clone to each simulated host
/// gives them a common bus. A publish reaches every subscription that exists at
/// that moment, including ones held by the publisher itself.
///
/// # Examples
///
/// ```rust
/// use fleet_sync::broadcast::{BroadcastBus, LocalBus};
///
/// # async fn example() -> fleet_sync::error::Result<()> {
/// let host_a = LocalBus::new();
/// let host_b = host_a.clone();
///
/// let mut inbox = host_b.subscribe("fleet-sync/cache").await?;
/// host_a.publish("fleet-sync/cache", "hello".to_string()).await?;
/// assert_eq!(inbox.recv().await.as_deref(), Some("hello"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBus {
    hub: Arc<Hub>,
}

impl LocalBus {
    /// Create a bus with a per-channel backlog of 256 messages.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose slowest subscriber may fall `capacity` messages behind
    /// before it starts missing messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hub: Arc::new(Hub {
                channels: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastBus for LocalBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        // No receivers is not an error for fire-and-forget delivery.
        let delivered = self.hub.sender(channel).send(payload).unwrap_or(0);
        tracing::trace!(channel, delivered, "published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let mut source = self.hub.sender(channel).subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let name = channel.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    received = source.recv() => match received {
                        Ok(payload) => {
                            if tx.send(payload).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(
                                channel = %name,
                                missed,
                                "subscriber lagged, messages dropped"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(Subscription::new(channel, rx))
    }
}
