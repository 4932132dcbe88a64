//! # Bus Adapter Trait
//!
//! The seam between the coordination core and whatever transport carries the
//! session's messages. The in-process broker in [`crate::memory`] is the
//! default implementation; a networked broker client would implement the same
//! trait.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use crate::memory::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Publish/subscribe access to named channels carrying byte payloads.
#[async_trait]
pub trait BusAdapter: Send + Sync {
    /// Publish a payload on a channel.
    ///
    /// Returns `true` when the bus accepted the message. A `false` return
    /// means the action did not take effect and the caller must not change
    /// state.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> bool;

    /// Subscribe to a channel.
    ///
    /// The subscription yields the channel's retained payload (if any) first,
    /// then every payload published after the call.
    fn subscribe(&self, channel: &str) -> Subscription;
}

/// A bus that refuses every publish.
///
/// For testing the `PublishFailure` paths: state machines gated on publish
/// success must stay in their prior state when driven through this adapter.
#[derive(Debug)]
pub struct RejectingBus {
    // Never sent to; subscriptions stay silent.
    sender: broadcast::Sender<Vec<u8>>,
}

impl RejectingBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl Default for RejectingBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusAdapter for RejectingBus {
    async fn publish(&self, channel: &str, _payload: Vec<u8>) -> bool {
        warn!(channel, "RejectingBus dropped publish");
        false
    }

    fn subscribe(&self, _channel: &str) -> Subscription {
        Subscription::new(self.sender.subscribe(), None)
    }
}
