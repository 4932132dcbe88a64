//! # Claim Arbitrator
//!
//! Per-request state machine on the TA side, implementing the
//! claim/confirm/timeout handshake. Exactly one TA ends up serving a
//! request: the requester confirms the first claim it sees, and every other
//! claimant falls back to `Unclaimed` when its claim-wait timer fires.
//!
//! Timer cancellation works by generation: every transition out of `Waiting`
//! bumps the generation, so a timeout trigger carrying a stale generation is
//! a no-op. The sleep task itself never needs aborting.

use std::sync::Arc;

use lq_protocol::{
    encode, CancelClaimPayload, ClaimRequestPayload, MessageType, ResolveRequestPayload,
};
use shared_bus::{BusAdapter, ChannelSet};
use shared_types::{CoordinationError, RequestId};
use tracing::{debug, info, warn};

/// Responder-side claim states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimState {
    /// No bid in flight; the request is up for grabs.
    #[default]
    Unclaimed,
    /// Claim published, awaiting the requester's confirm.
    Waiting,
    /// Our claim was confirmed; we are serving the request.
    Claimed,
}

/// One TA's interaction with one help request.
pub struct ClaimArbitrator {
    request_id: RequestId,
    ta_name: String,
    bus: Arc<dyn BusAdapter>,
    queue_channel: String,
    state: ClaimState,
    generation: u64,
}

impl ClaimArbitrator {
    #[must_use]
    pub fn new(
        request_id: RequestId,
        ta_name: impl Into<String>,
        bus: Arc<dyn BusAdapter>,
        channels: &ChannelSet,
    ) -> Self {
        Self {
            request_id,
            ta_name: ta_name.into(),
            bus,
            queue_channel: channels.queue(),
            state: ClaimState::Unclaimed,
            generation: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ClaimState {
        self.state
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Current claim generation; timeout triggers must quote it.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `Unclaimed --claim--> Waiting`. Publishes the bid and returns the
    /// generation the caller must tag the claim-wait timer with.
    pub async fn claim(&mut self) -> Result<u64, CoordinationError> {
        if self.state != ClaimState::Unclaimed {
            return Err(CoordinationError::ClaimPending {
                id: self.request_id,
            });
        }

        let payload = ClaimRequestPayload {
            id: self.request_id,
            ta_name: self.ta_name.clone(),
        };
        if !self.publish(MessageType::ClaimRequest, &payload).await {
            return Err(CoordinationError::PublishFailure {
                channel: self.queue_channel.clone(),
            });
        }

        info!(id = %self.request_id, ta = %self.ta_name, "claim published");
        self.state = ClaimState::Waiting;
        self.generation += 1;
        Ok(self.generation)
    }

    /// `Waiting --ConfirmClaim for self--> Claimed`. Returns whether the
    /// confirm was accepted; anything else is a stale signal and a no-op.
    pub fn on_confirm(&mut self, ta_name: &str) -> bool {
        if self.state != ClaimState::Waiting || ta_name != self.ta_name {
            debug!(id = %self.request_id, ta = %ta_name, "confirm ignored");
            return false;
        }
        info!(id = %self.request_id, "claim confirmed, serving request");
        self.state = ClaimState::Claimed;
        self.generation += 1; // cancels the pending timer
        true
    }

    /// Claim-wait timer fired. Only a timer from the current generation in
    /// `Waiting` loses the claim; stale timers no-op.
    pub fn on_timeout(&mut self, generation: u64) -> bool {
        if self.state != ClaimState::Waiting || generation != self.generation {
            debug!(id = %self.request_id, generation, "stale claim timer ignored");
            return false;
        }
        warn!(id = %self.request_id, "claim lost, no confirm before timeout");
        self.state = ClaimState::Unclaimed;
        self.generation += 1;
        true
    }

    /// Operator aborts the claim, from `Waiting` (confirm never received)
    /// or `Claimed` (release back for any TA to claim again). Returns
    /// whether a release was actually published.
    pub async fn cancel_claim(&mut self) -> Result<bool, CoordinationError> {
        if self.state == ClaimState::Unclaimed {
            return Ok(false);
        }
        let payload = CancelClaimPayload {
            id: self.request_id,
        };
        if !self.publish(MessageType::CancelClaim, &payload).await {
            return Err(CoordinationError::PublishFailure {
                channel: self.queue_channel.clone(),
            });
        }
        info!(id = %self.request_id, "claim released");
        self.state = ClaimState::Unclaimed;
        self.generation += 1;
        Ok(true)
    }

    /// `Claimed --resolve--> Unclaimed`. Publishes the resolution that
    /// removes the request from every client's backlog. No-op outside
    /// `Claimed`.
    pub async fn resolve(&mut self) -> Result<bool, CoordinationError> {
        if self.state != ClaimState::Claimed {
            debug!(id = %self.request_id, state = ?self.state, "resolve ignored");
            return Ok(false);
        }
        let payload = ResolveRequestPayload {
            id: self.request_id,
        };
        if !self.publish(MessageType::ResolveRequest, &payload).await {
            return Err(CoordinationError::PublishFailure {
                channel: self.queue_channel.clone(),
            });
        }
        info!(id = %self.request_id, "request resolved");
        self.state = ClaimState::Unclaimed;
        self.generation += 1;
        Ok(true)
    }

    /// The request vanished from the backlog (cancelled or resolved
    /// elsewhere); whatever we were doing with it is over.
    pub fn reset(&mut self) {
        if self.state != ClaimState::Unclaimed {
            debug!(id = %self.request_id, "claim target left the backlog");
        }
        self.state = ClaimState::Unclaimed;
        self.generation += 1;
    }

    async fn publish<T: serde::Serialize>(&self, kind: MessageType, payload: &T) -> bool {
        let bytes = match encode(kind, payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "envelope encoding failed");
                return false;
            }
        };
        self.bus.publish(&self.queue_channel, bytes).await
    }
}
