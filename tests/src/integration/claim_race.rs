//! # Claim Race Tests
//!
//! Competing TA clients bidding for the same request. The requester is the
//! sole arbiter: it confirms exactly one claim, and there is no rejection
//! message, so every losing claimant must recover through its own
//! claim-wait timeout.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::watch;
    use tokio::time::timeout;

    use lq_protocol::{encode, AddRequestPayload, MessageType};
    use lq_requester::{RequesterState, StudentClient};
    use lq_responder::{ClaimState, ResponderConfig, TaClient};
    use shared_bus::{BusAdapter, ChannelSet, InMemoryBus};
    use shared_types::{HelpRequest, RequestDetail, RequestId, StudentSession, TaSession};

    fn ta_config() -> ResponderConfig {
        ResponderConfig {
            claim_wait: Duration::from_millis(100),
        }
    }

    async fn settle<T, F>(rx: &mut watch::Receiver<T>, mut pred: F) -> T
    where
        T: Clone,
        F: FnMut(&T) -> bool,
    {
        timeout(Duration::from_secs(2), async {
            loop {
                if pred(&rx.borrow()) {
                    return rx.borrow().clone();
                }
                rx.changed().await.expect("snapshot channel open");
            }
        })
        .await
        .expect("condition within deadline")
    }

    #[tokio::test]
    async fn test_first_claim_wins_and_loser_times_out() {
        let bus: Arc<dyn BusAdapter> = Arc::new(InMemoryBus::new());
        let channels = ChannelSet::default();
        let alice = TaClient::spawn(TaSession::new("ta-alice"), bus.clone(), &channels, ta_config());
        let bob = TaClient::spawn(TaSession::new("ta-bob"), bus.clone(), &channels, ta_config());
        let student = StudentClient::spawn(StudentSession::new(5), bus.clone(), &channels);

        let mut alice_rx = alice.watch();
        let mut bob_rx = bob.watch();
        let mut student_rx = student.watch();

        let id = student
            .submit(1, 0, RequestDetail::default())
            .await
            .expect("submit");
        settle(&mut alice_rx, |s| s.backlog_len == 1).await;
        settle(&mut bob_rx, |s| s.backlog_len == 1).await;

        // Alice's bid hits the wire first, so the student confirms her and
        // silently ignores Bob's.
        alice.claim(id).await.expect("alice claim");
        bob.claim(id).await.expect("bob claim");

        let winner = settle(&mut alice_rx, |s| s.claim_state == ClaimState::Claimed).await;
        assert_eq!(winner.active_claim, Some(id));

        let loser = settle(&mut bob_rx, |s| {
            s.claim_state == ClaimState::Unclaimed && s.active_claim.is_none()
        })
        .await;
        // The request itself stays in Bob's backlog; only his claim died.
        assert_eq!(loser.backlog_len, 1);

        let snap = settle(&mut student_rx, |s| s.state == RequesterState::Confirmed).await;
        assert_eq!(snap.claimed_by.as_deref(), Some("ta-alice"));

        student.shutdown().await;
        alice.shutdown().await;
        bob.shutdown().await;
    }

    #[tokio::test]
    async fn test_released_claim_is_reclaimable_by_another_ta() {
        let bus: Arc<dyn BusAdapter> = Arc::new(InMemoryBus::new());
        let channels = ChannelSet::default();
        let alice = TaClient::spawn(TaSession::new("ta-alice"), bus.clone(), &channels, ta_config());
        let bob = TaClient::spawn(TaSession::new("ta-bob"), bus.clone(), &channels, ta_config());
        let student = StudentClient::spawn(StudentSession::new(6), bus.clone(), &channels);

        let mut alice_rx = alice.watch();
        let mut bob_rx = bob.watch();
        let mut student_rx = student.watch();

        let id = student
            .submit(2, 1, RequestDetail::default())
            .await
            .expect("submit");
        settle(&mut alice_rx, |s| s.backlog_len == 1).await;
        settle(&mut bob_rx, |s| s.backlog_len == 1).await;

        alice.claim(id).await.expect("alice claim");
        settle(&mut alice_rx, |s| s.claim_state == ClaimState::Claimed).await;
        settle(&mut student_rx, |s| s.claimed_by.as_deref() == Some("ta-alice")).await;

        // Alice hands the request back: the student returns to the queue
        // and the next claim can win.
        assert!(alice.cancel_claim().await.expect("release"));
        settle(&mut student_rx, |s| {
            s.state == RequesterState::Sent && s.claimed_by.is_none()
        })
        .await;

        bob.claim(id).await.expect("bob claim");
        settle(&mut bob_rx, |s| s.claim_state == ClaimState::Claimed).await;
        let snap = settle(&mut student_rx, |s| s.state == RequesterState::Confirmed).await;
        assert_eq!(snap.claimed_by.as_deref(), Some("ta-bob"));

        student.shutdown().await;
        alice.shutdown().await;
        bob.shutdown().await;
    }

    #[tokio::test]
    async fn test_unconfirmed_claim_can_retry_after_timeout() {
        let bus: Arc<dyn BusAdapter> = Arc::new(InMemoryBus::new());
        let channels = ChannelSet::default();
        let alice = TaClient::spawn(TaSession::new("ta-alice"), bus.clone(), &channels, ta_config());
        let mut alice_rx = alice.watch();

        // A request with no live requester behind it: nobody will confirm.
        let request = HelpRequest::new(9, 1, 0, RequestDetail::default());
        let id = request.id;
        let bytes = encode(MessageType::AddRequest, &AddRequestPayload::from(&request)).unwrap();
        assert!(bus.publish(&channels.queue(), bytes).await);
        settle(&mut alice_rx, |s| s.backlog_len == 1).await;

        alice.claim(id).await.expect("first claim");
        settle(&mut alice_rx, |s| s.claim_state == ClaimState::Waiting).await;
        settle(&mut alice_rx, |s| s.claim_state == ClaimState::Unclaimed).await;

        // The dead claim does not wedge the arbitrator.
        alice.claim(id).await.expect("second claim");
        settle(&mut alice_rx, |s| s.claim_state == ClaimState::Waiting).await;

        alice.shutdown().await;
    }

    #[tokio::test]
    async fn test_claim_for_missing_request_never_blocks_real_work() {
        let bus: Arc<dyn BusAdapter> = Arc::new(InMemoryBus::new());
        let channels = ChannelSet::default();
        let alice = TaClient::spawn(TaSession::new("ta-alice"), bus.clone(), &channels, ta_config());
        let student = StudentClient::spawn(StudentSession::new(3), bus.clone(), &channels);

        let mut alice_rx = alice.watch();
        let mut student_rx = student.watch();

        // A claim for an id nobody announced fails fast without publishing.
        assert!(alice.claim(RequestId::new()).await.is_err());

        let id = student
            .submit(1, 1, RequestDetail::default())
            .await
            .expect("submit");
        settle(&mut alice_rx, |s| s.backlog_len == 1).await;

        alice.claim(id).await.expect("real claim");
        settle(&mut alice_rx, |s| s.claim_state == ClaimState::Claimed).await;
        settle(&mut student_rx, |s| s.state == RequesterState::Confirmed).await;

        student.shutdown().await;
        alice.shutdown().await;
    }
}
