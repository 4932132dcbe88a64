//! # Request Lifecycle State Machine
//!
//! One instance per student client, owning the client's single allowed
//! outstanding request. Triggers arrive either from the UI (submit, cancel,
//! edit) or from the bus listener (decoded envelopes); the dispatcher in
//! [`crate::client`] guarantees no two triggers run concurrently.

use std::sync::Arc;

use lq_protocol::{
    encode, AddRequestPayload, CancelClaimPayload, CancelRequestPayload, ClaimRequestPayload,
    ConfirmClaimPayload, Envelope, MessageType, ResolveRequestPayload,
};
use lq_queue::QueueManager;
use shared_bus::{BusAdapter, ChannelSet};
use shared_types::{
    CoordinationError, HelpRequest, RequestDetail, RequestId, RequestStatus, StudentSession,
};
use tracing::{debug, info, warn};

/// Requester-side lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequesterState {
    /// No outstanding request.
    #[default]
    Unsent,
    /// Request published, awaiting a claim.
    Sent,
    /// A TA's claim has been confirmed.
    Confirmed,
}

/// The requester-side coordination core.
pub struct RequestLifecycle {
    session: StudentSession,
    bus: Arc<dyn BusAdapter>,
    queue_channel: String,
    state: RequesterState,
    request: Option<HelpRequest>,
    queue: QueueManager,
}

impl RequestLifecycle {
    #[must_use]
    pub fn new(session: StudentSession, bus: Arc<dyn BusAdapter>, channels: &ChannelSet) -> Self {
        Self {
            session,
            bus,
            queue_channel: channels.queue(),
            state: RequesterState::Unsent,
            request: None,
            queue: QueueManager::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RequesterState {
        self.state
    }

    /// The outstanding request, if any.
    #[must_use]
    pub fn request(&self) -> Option<&HelpRequest> {
        self.request.as_ref()
    }

    /// (backlog size, own rank) as last derived from bus events.
    #[must_use]
    pub fn queue_positions(&self) -> (usize, Option<usize>) {
        (self.queue.global_position(), self.queue.local_position())
    }

    /// `Unsent --submit--> Sent`.
    ///
    /// Constructs the request and announces it on the queue channel. While a
    /// request is active the submit is rejected with
    /// [`CoordinationError::DuplicateActiveRequest`] before anything is
    /// published; if the publish is refused the handle is discarded and the
    /// machine stays in `Unsent`.
    pub async fn submit(
        &mut self,
        module_number: u32,
        task_index: u32,
        detail: RequestDetail,
    ) -> Result<RequestId, CoordinationError> {
        if self.state != RequesterState::Unsent {
            let id = self.request.as_ref().map_or_else(RequestId::new, |r| r.id);
            return Err(CoordinationError::DuplicateActiveRequest { id });
        }

        let mut request =
            HelpRequest::new(self.session.group_number, module_number, task_index, detail);
        let payload = AddRequestPayload::from(&request);
        if !self.publish(MessageType::AddRequest, &payload).await {
            return Err(CoordinationError::PublishFailure {
                channel: self.queue_channel.clone(),
            });
        }

        info!(id = %request.id, group = self.session.group_number, "help request submitted");
        request.status = RequestStatus::Sent;
        let id = request.id;
        self.request = Some(request);
        self.state = RequesterState::Sent;
        Ok(id)
    }

    /// `Sent --cancel--> Unsent`.
    ///
    /// Only transitions when the withdrawal actually went out; a refused
    /// publish leaves the request outstanding. In any other state this is a
    /// safe no-op.
    pub async fn cancel(&mut self) -> Result<(), CoordinationError> {
        if self.state != RequesterState::Sent {
            debug!(state = ?self.state, "cancel ignored outside Sent");
            return Ok(());
        }
        let Some(id) = self.request.as_ref().map(|r| r.id) else {
            return Ok(());
        };

        let payload = CancelRequestPayload { id };
        if !self.publish(MessageType::CancelRequest, &payload).await {
            return Err(CoordinationError::PublishFailure {
                channel: self.queue_channel.clone(),
            });
        }

        info!(%id, "help request withdrawn");
        self.request = None;
        self.state = RequesterState::Unsent;
        Ok(())
    }

    /// Edit the free-form detail of the outstanding request.
    ///
    /// Allowed only while the request is still editable (`Unsent`/`Sent`,
    /// unclaimed); returns whether the edit was applied. Edits are local:
    /// no wire message exists for them.
    pub fn edit_details(&mut self, detail: RequestDetail) -> bool {
        match self.request.as_mut() {
            Some(request) if request.is_editable() => {
                request.is_online = detail.is_online;
                request.zoom_url = detail.zoom_url;
                request.comment = detail.comment;
                true
            }
            Some(request) => {
                debug!(id = %request.id, "edit rejected, request no longer editable");
                false
            }
            None => false,
        }
    }

    /// Dispatch a decoded bus envelope.
    ///
    /// Handlers are idempotent or safe no-ops under duplicate and
    /// out-of-order delivery; malformed records are dropped with a warning
    /// by the caller before reaching here.
    pub async fn on_envelope(&mut self, envelope: &Envelope) {
        match envelope.request_type {
            MessageType::AddRequest => match envelope.payload::<AddRequestPayload>() {
                Ok(payload) => self.on_add(&payload),
                Err(err) => warn!(%err, "dropping add record"),
            },
            MessageType::CancelRequest => match envelope.payload::<CancelRequestPayload>() {
                Ok(payload) => self.on_remove(payload.id),
                Err(err) => warn!(%err, "dropping cancel record"),
            },
            MessageType::ResolveRequest => match envelope.payload::<ResolveRequestPayload>() {
                Ok(payload) => self.on_remove(payload.id),
                Err(err) => warn!(%err, "dropping resolve record"),
            },
            MessageType::ClaimRequest => match envelope.payload::<ClaimRequestPayload>() {
                Ok(payload) => self.on_claim(payload).await,
                Err(err) => warn!(%err, "dropping claim record"),
            },
            MessageType::CancelClaim => match envelope.payload::<CancelClaimPayload>() {
                Ok(payload) => self.on_cancel_claim(payload.id),
                Err(err) => warn!(%err, "dropping cancel-claim record"),
            },
            // Confirms are TA-directed; feedback is outside the core.
            MessageType::ConfirmClaim | MessageType::SendFeedback => {
                debug!(kind = ?envelope.request_type, "not requester-directed, ignored");
            }
        }
    }

    /// Queue-update signal: somebody's request entered the backlog.
    fn on_add(&mut self, payload: &AddRequestPayload) {
        let is_mine = self.request.as_ref().map(|r| r.id) == Some(payload.id);
        self.queue.on_add(payload.id, payload.created_at, is_mine);
        self.refresh_queue_pos();
    }

    /// Queue-update signal: a request left the backlog (cancel and resolve
    /// have identical queue effect). If it was our own, the lifecycle
    /// completes as well.
    fn on_remove(&mut self, id: RequestId) {
        self.queue.on_cancel(id);
        self.refresh_queue_pos();

        let is_mine = self.request.as_ref().map(|r| r.id) == Some(id);
        if !is_mine {
            return;
        }
        match self.state {
            RequesterState::Confirmed => {
                info!(%id, "help request resolved");
            }
            RequesterState::Sent => {
                // A well-behaved responder never removes an unclaimed
                // request; tolerate it so our view matches the other clients.
                warn!(%id, "own request removed while still Sent");
            }
            RequesterState::Unsent => return,
        }
        if let Some(request) = self.request.as_mut() {
            request.status = RequestStatus::Completed;
        }
        self.request = None;
        self.state = RequesterState::Unsent;
    }

    /// Claim arbitration: confirm the first claim for our own unclaimed
    /// request, silently ignore everything else (first-claim-wins).
    async fn on_claim(&mut self, payload: ClaimRequestPayload) {
        let claimable = matches!(self.state, RequesterState::Sent)
            && self
                .request
                .as_ref()
                .is_some_and(|r| r.id == payload.id && r.claimed_by.is_none());
        if !claimable {
            debug!(id = %payload.id, ta = %payload.ta_name, "claim ignored");
            return;
        }

        let confirm = ConfirmClaimPayload {
            ta_name: payload.ta_name.clone(),
        };
        if !self.publish(MessageType::ConfirmClaim, &confirm).await {
            // The TA's claim-wait timeout recovers; we stay claimable.
            warn!(id = %payload.id, "confirm publish refused, claim not accepted");
            return;
        }

        info!(id = %payload.id, ta = %payload.ta_name, "claim confirmed");
        if let Some(request) = self.request.as_mut() {
            request.claimed_by = Some(payload.ta_name);
            request.status = RequestStatus::Confirmed;
        }
        self.state = RequesterState::Confirmed;
    }

    /// `Confirmed --CancelClaim--> Sent`: the TA released us back in line.
    fn on_cancel_claim(&mut self, id: RequestId) {
        let is_mine = self.request.as_ref().map(|r| r.id) == Some(id);
        if !is_mine || self.state != RequesterState::Confirmed {
            debug!(%id, "cancel-claim ignored");
            return;
        }
        info!(%id, "claim released, request back in queue");
        if let Some(request) = self.request.as_mut() {
            request.claimed_by = None;
            request.status = RequestStatus::Sent;
        }
        self.state = RequesterState::Sent;
    }

    fn refresh_queue_pos(&mut self) {
        if let Some(request) = self.request.as_mut() {
            request.queue_pos = self.queue.local_position();
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use lq_protocol::decode;
    use shared_bus::{InMemoryBus, RejectingBus, Subscription};
    use std::time::Duration;
    use tokio::time::timeout;

    fn detail(comment: &str) -> RequestDetail {
        RequestDetail {
            is_online: false,
            zoom_url: String::new(),
            comment: comment.into(),
        }
    }

    fn lifecycle_with(bus: Arc<dyn BusAdapter>) -> RequestLifecycle {
        RequestLifecycle::new(StudentSession::new(4), bus, &ChannelSet::default())
    }

    async fn next_envelope(sub: &mut Subscription) -> Envelope {
        let bytes = timeout(Duration::from_millis(200), sub.recv())
            .await
            .expect("timeout")
            .expect("payload");
        decode(&bytes).expect("well-formed envelope")
    }

    /// Drive a lifecycle into Sent with its own add looped back.
    async fn submitted(lc: &mut RequestLifecycle) -> RequestId {
        let id = lc.submit(1, 0, detail("help")).await.expect("submit");
        let add = AddRequestPayload::from(lc.request().unwrap());
        lc.on_envelope(&Envelope::new(MessageType::AddRequest, &add).unwrap())
            .await;
        id
    }

    fn claim_envelope(id: RequestId, ta: &str) -> Envelope {
        Envelope::new(
            MessageType::ClaimRequest,
            &ClaimRequestPayload {
                id,
                ta_name: ta.into(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_publishes_and_transitions() {
        let bus = Arc::new(InMemoryBus::new());
        let mut sub = bus.subscribe(&ChannelSet::default().queue());
        let mut lc = lifecycle_with(bus);

        let id = lc.submit(2, 1, detail("stuck")).await.expect("submit");
        assert_eq!(lc.state(), RequesterState::Sent);
        assert_eq!(lc.request().unwrap().status, RequestStatus::Sent);

        let envelope = next_envelope(&mut sub).await;
        assert_eq!(envelope.request_type, MessageType::AddRequest);
        assert_eq!(envelope.payload::<AddRequestPayload>().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_second_submit_is_rejected_before_publish() {
        let bus = Arc::new(InMemoryBus::new());
        let mut lc = lifecycle_with(bus);

        lc.submit(1, 0, detail("a")).await.expect("first submit");
        let err = lc.submit(1, 0, detail("b")).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinationError::DuplicateActiveRequest { .. }
        ));
        assert_eq!(lc.state(), RequesterState::Sent);
    }

    #[tokio::test]
    async fn test_failed_submit_discards_handle() {
        let mut lc = lifecycle_with(Arc::new(RejectingBus::new()));

        let err = lc.submit(1, 0, detail("x")).await.unwrap_err();
        assert!(matches!(err, CoordinationError::PublishFailure { .. }));
        assert_eq!(lc.state(), RequesterState::Unsent);
        assert!(lc.request().is_none());
    }

    #[tokio::test]
    async fn test_failed_cancel_keeps_request_outstanding() {
        let bus = Arc::new(InMemoryBus::new());
        let mut lc = lifecycle_with(bus);
        let id = submitted(&mut lc).await;

        // Swap in a refusing transport for the cancel attempt.
        lc.bus = Arc::new(RejectingBus::new());
        let err = lc.cancel().await.unwrap_err();
        assert!(matches!(err, CoordinationError::PublishFailure { .. }));
        assert_eq!(lc.state(), RequesterState::Sent);
        assert_eq!(lc.request().unwrap().id, id);
        assert_eq!(lc.queue.active_request().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_cancel_round_trip_clears_everything() {
        let bus = Arc::new(InMemoryBus::new());
        let mut lc = lifecycle_with(bus);
        let id = submitted(&mut lc).await;

        lc.cancel().await.expect("cancel");
        assert_eq!(lc.state(), RequesterState::Unsent);
        assert!(lc.request().is_none());

        // Our own withdrawal loops back and clears the queue slot.
        lc.on_envelope(
            &Envelope::new(MessageType::CancelRequest, &CancelRequestPayload { id }).unwrap(),
        )
        .await;
        assert_eq!(lc.queue_positions(), (0, None));
    }

    #[tokio::test]
    async fn test_first_claim_wins_and_second_is_ignored() {
        let bus = Arc::new(InMemoryBus::new());
        let mut sub = bus.subscribe(&ChannelSet::default().queue());
        let mut lc = lifecycle_with(bus);
        let id = submitted(&mut lc).await;
        let _add = next_envelope(&mut sub).await;

        lc.on_envelope(&claim_envelope(id, "ta-alice")).await;
        assert_eq!(lc.state(), RequesterState::Confirmed);
        assert_eq!(lc.request().unwrap().claimed_by.as_deref(), Some("ta-alice"));

        let confirm = next_envelope(&mut sub).await;
        assert_eq!(confirm.request_type, MessageType::ConfirmClaim);
        assert_eq!(
            confirm.payload::<ConfirmClaimPayload>().unwrap().ta_name,
            "ta-alice"
        );

        // Second claim: no confirm sent, claim holder unchanged.
        lc.on_envelope(&claim_envelope(id, "ta-bob")).await;
        assert_eq!(lc.request().unwrap().claimed_by.as_deref(), Some("ta-alice"));
        let silence = timeout(Duration::from_millis(30), sub.recv()).await;
        assert!(silence.is_err(), "no message may follow a rejected claim");
    }

    #[tokio::test]
    async fn test_claim_for_other_request_is_safe_noop() {
        let bus = Arc::new(InMemoryBus::new());
        let mut lc = lifecycle_with(bus);
        submitted(&mut lc).await;

        lc.on_envelope(&claim_envelope(RequestId::new(), "ta-alice"))
            .await;
        assert_eq!(lc.state(), RequesterState::Sent);
        assert!(lc.request().unwrap().claimed_by.is_none());
    }

    #[tokio::test]
    async fn test_cancel_claim_returns_to_sent() {
        let bus = Arc::new(InMemoryBus::new());
        let mut lc = lifecycle_with(bus);
        let id = submitted(&mut lc).await;

        lc.on_envelope(&claim_envelope(id, "ta-alice")).await;
        assert_eq!(lc.state(), RequesterState::Confirmed);

        lc.on_envelope(
            &Envelope::new(MessageType::CancelClaim, &CancelClaimPayload { id }).unwrap(),
        )
        .await;
        assert_eq!(lc.state(), RequesterState::Sent);
        assert!(lc.request().unwrap().claimed_by.is_none());
        assert_eq!(lc.request().unwrap().status, RequestStatus::Sent);
    }

    #[tokio::test]
    async fn test_resolve_completes_the_lifecycle() {
        let bus = Arc::new(InMemoryBus::new());
        let mut lc = lifecycle_with(bus);
        let id = submitted(&mut lc).await;

        lc.on_envelope(&claim_envelope(id, "ta-alice")).await;
        lc.on_envelope(
            &Envelope::new(MessageType::ResolveRequest, &ResolveRequestPayload { id }).unwrap(),
        )
        .await;

        assert_eq!(lc.state(), RequesterState::Unsent);
        assert!(lc.request().is_none());
        assert_eq!(lc.queue_positions(), (0, None));

        // Free for a fresh submit.
        assert!(lc.submit(1, 0, detail("again")).await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_positions_track_other_groups() {
        let bus = Arc::new(InMemoryBus::new());
        let mut lc = lifecycle_with(bus);

        // Someone else is already in line.
        let earlier = AddRequestPayload {
            id: RequestId::new(),
            group_number: 9,
            module_number: 1,
            task_index: 0,
            is_online: false,
            zoom_url: String::new(),
            comment: "first in line".into(),
            created_at: 1,
        };
        lc.on_envelope(&Envelope::new(MessageType::AddRequest, &earlier).unwrap())
            .await;

        submitted(&mut lc).await;
        assert_eq!(lc.queue_positions(), (2, Some(2)));
        assert_eq!(lc.request().unwrap().queue_pos, Some(2));

        // The earlier request resolves; we move up.
        lc.on_envelope(
            &Envelope::new(
                MessageType::ResolveRequest,
                &ResolveRequestPayload { id: earlier.id },
            )
            .unwrap(),
        )
        .await;
        assert_eq!(lc.queue_positions(), (1, Some(1)));
        assert_eq!(lc.request().unwrap().queue_pos, Some(1));
    }

    #[tokio::test]
    async fn test_edit_allowed_only_while_unclaimed() {
        let bus = Arc::new(InMemoryBus::new());
        let mut lc = lifecycle_with(bus);
        let id = submitted(&mut lc).await;

        assert!(lc.edit_details(detail("updated comment")));
        assert_eq!(lc.request().unwrap().comment, "updated comment");

        lc.on_envelope(&claim_envelope(id, "ta-alice")).await;
        assert!(!lc.edit_details(detail("too late")));
        assert_eq!(lc.request().unwrap().comment, "updated comment");
    }
}
