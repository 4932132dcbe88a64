//! # Channel Names
//!
//! Stable channel identifiers shared by every client of a lab session.
//! All coordination traffic (add/cancel/claim/confirm/cancel-claim/resolve)
//! flows on the queue channel; the TA and task channels carry TA-directed
//! broadcasts and feedback submissions respectively.

/// Default channel-name prefix for a lab session.
pub const DEFAULT_BASE: &str = "lab/session";

/// Derives the channel names used by one lab session from a common prefix.
///
/// Clients of the same session must be constructed with the same base or
/// they will not see each other's traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    base: String,
}

impl ChannelSet {
    /// Channel set rooted at a custom prefix.
    #[must_use]
    pub fn with_base(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Broadcast channel carrying the request-coordination traffic.
    #[must_use]
    pub fn queue(&self) -> String {
        format!("{}/queue", self.base)
    }

    /// TA-directed broadcast channel.
    #[must_use]
    pub fn ta(&self) -> String {
        format!("{}/ta", self.base)
    }

    /// Feedback submission channel (outside the coordination core).
    #[must_use]
    pub fn task(&self) -> String {
        format!("{}/task", self.base)
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self::with_base(DEFAULT_BASE)
    }
}
