//! # Shared Bus - Message Bus Adapter
//!
//! Thin publish/subscribe interface the coordination core talks to. The bus
//! is the only thing clients share: a student client and a TA client never
//! see each other's memory, only byte payloads on named channels.
//!
//! ```text
//! ┌──────────────┐                      ┌──────────────┐
//! │ Student      │                      │ TA client    │
//! │ client       │    publish()         │              │
//! │              │ ───────┐             │              │
//! └──────────────┘        ▼             └──────────────┘
//!                   ┌──────────────┐           ↑
//!                   │  queue chan  │ ──────────┘
//!                   └──────────────┘  subscribe()
//! ```
//!
//! ## Contract
//!
//! - `publish` is fire-and-forget; its boolean result gates the caller's
//!   state transitions (a `false` means "the action did not take effect").
//! - Delivery is at-least-once and unordered from the protocol's point of
//!   view; every handler upstream is idempotent or a safe no-op.
//! - Each channel retains its last payload so late joiners observe the most
//!   recent message (MQTT-style retain).

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapter;
pub mod channels;
pub mod memory;

pub use adapter::{BusAdapter, RejectingBus};
pub use channels::{ChannelSet, DEFAULT_BASE};
pub use memory::{InMemoryBus, Subscription};

/// Maximum payloads buffered per channel before slow subscribers lag.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 256);
    }
}
