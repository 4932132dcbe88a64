//! # Error Taxonomy
//!
//! Nothing in the coordination core is fatal: every variant here resolves to
//! "no state change, safe to retry the triggering user action".

use thiserror::Error;

use crate::entities::RequestId;

/// Errors surfaced by the request-coordination protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinationError {
    /// The bus did not accept a publish. The local state machine stays in
    /// its prior state and the caller is told the action did not take effect.
    #[error("Publish failure on channel '{channel}'")]
    PublishFailure { channel: String },

    /// A requester attempted a second submit while a request is active.
    /// Rejected before any publish.
    #[error("Duplicate active request: {id} is still outstanding")]
    DuplicateActiveRequest { id: RequestId },

    /// A TA attempted a new claim while one is already pending or held.
    /// Rejected before any publish.
    #[error("Claim already in flight for request {id}")]
    ClaimPending { id: RequestId },

    /// A confirm or cancel arrived for a request id unknown locally. Ignored.
    #[error("Stale claim signal for unknown request {id}")]
    StaleClaim { id: RequestId },

    /// The client actor is shutting down and dropped the command.
    #[error("Client is not running")]
    ClientClosed,
}
