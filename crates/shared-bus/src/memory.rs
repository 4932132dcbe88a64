//! # In-Memory Broker
//!
//! Per-channel `tokio::sync::broadcast` fan-out with a retained last value,
//! mirroring the retain semantics of the MQTT-style brokers a deployed
//! session would run against. Suitable for tests, demos, and single-process
//! sessions; a distributed deployment would implement [`BusAdapter`] over a
//! real broker client instead.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::adapter::BusAdapter;
use crate::DEFAULT_CHANNEL_CAPACITY;

struct Channel {
    sender: broadcast::Sender<Vec<u8>>,
    retained: Option<Vec<u8>>,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            retained: None,
        }
    }
}

/// In-memory implementation of the bus.
pub struct InMemoryBus {
    channels: RwLock<HashMap<String, Channel>>,
    capacity: usize,
}

impl InMemoryBus {
    /// Create a bus with the default per-channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with a custom per-channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of active subscribers on a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .ok()
            .and_then(|map| map.get(channel).map(|ch| ch.sender.receiver_count()))
            .unwrap_or(0)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusAdapter for InMemoryBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> bool {
        let Ok(mut map) = self.channels.write() else {
            warn!(channel, "bus state poisoned, dropping publish");
            return false;
        };
        let ch = map
            .entry(channel.to_owned())
            .or_insert_with(|| Channel::new(self.capacity));
        ch.retained = Some(payload.clone());

        match ch.sender.send(payload) {
            Ok(receivers) => {
                debug!(channel, receivers, "payload published");
            }
            Err(_) => {
                // No live subscribers; the retained copy still serves late
                // joiners, so the publish counts as accepted.
                debug!(channel, "payload retained, no live subscribers");
            }
        }
        true
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        let Ok(mut map) = self.channels.write() else {
            // Poisoned state: hand back a dead subscription instead of
            // panicking inside a client task.
            let (sender, receiver) = broadcast::channel(1);
            drop(sender);
            return Subscription::new(receiver, None);
        };
        let ch = map
            .entry(channel.to_owned())
            .or_insert_with(|| Channel::new(self.capacity));
        debug!(channel, "new subscription");
        Subscription::new(ch.sender.subscribe(), ch.retained.clone())
    }
}

/// A handle for receiving payloads from one channel.
pub struct Subscription {
    receiver: broadcast::Receiver<Vec<u8>>,
    retained: Option<Vec<u8>>,
}

impl Subscription {
    #[must_use]
    pub(crate) fn new(receiver: broadcast::Receiver<Vec<u8>>, retained: Option<Vec<u8>>) -> Self {
        Self { receiver, retained }
    }

    /// Receive the next payload.
    ///
    /// Yields the channel's retained payload first (if one existed at
    /// subscribe time), then live traffic. Returns `None` once the channel
    /// is closed. Lagged subscribers skip the overwritten payloads and keep
    /// going; the protocol above tolerates loss by construction.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        if let Some(retained) = self.retained.take() {
            return Some(retained);
        }
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "subscriber lagged, payloads skipped");
                }
            }
        }
    }
}
