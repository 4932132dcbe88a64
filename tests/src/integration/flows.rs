//! # Coordination Flow Tests
//!
//! Full submit/claim/confirm/resolve rounds with real student and TA clients
//! sharing one in-memory bus.
//!
//! ## Flows Tested
//!
//! 1. **Student → TA → Student**: a request travels the whole lifecycle and
//!    every party converges on the same outcome
//! 2. **Queue fairness**: ranks follow arrival order and only removals ahead
//!    of a request move it up
//! 3. **Withdrawal**: a cancel empties every backlog and stales later claims

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::watch;
    use tokio::time::{sleep, timeout};

    use lq_requester::{RequesterState, StudentClient};
    use lq_responder::{ClaimState, ResponderConfig, TaClient};
    use shared_bus::{BusAdapter, ChannelSet, InMemoryBus};
    use shared_types::{CoordinationError, RequestDetail, StudentSession, TaSession};

    fn bus() -> Arc<dyn BusAdapter> {
        Arc::new(InMemoryBus::new())
    }

    fn ta_config() -> ResponderConfig {
        ResponderConfig {
            claim_wait: Duration::from_millis(200),
        }
    }

    fn detail(comment: &str) -> RequestDetail {
        RequestDetail {
            is_online: false,
            zoom_url: String::new(),
            comment: comment.into(),
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
    async fn test_full_round_trip_converges_everywhere() {
        let bus = bus();
        let channels = ChannelSet::default();
        let ta = TaClient::spawn(TaSession::new("ta-alice"), bus.clone(), &channels, ta_config());
        let student = StudentClient::spawn(StudentSession::new(4), bus.clone(), &channels);

        let mut ta_rx = ta.watch();
        let mut student_rx = student.watch();

        let id = student
            .submit(1, 2, detail("merge conflict maze"))
            .await
            .expect("submit");

        settle(&mut ta_rx, |s| s.backlog_len == 1).await;
        let snap = settle(&mut student_rx, |s| s.queue_pos.is_some()).await;
        assert_eq!(snap.state, RequesterState::Sent);
        assert_eq!(snap.queue_pos, Some(1));

        // The TA claims; the student confirms the first claim it sees, so
        // both sides converge without further driving.
        ta.claim(id).await.expect("claim");
        let ta_snap = settle(&mut ta_rx, |s| s.claim_state == ClaimState::Claimed).await;
        assert_eq!(ta_snap.active_claim, Some(id));

        let snap = settle(&mut student_rx, |s| s.state == RequesterState::Confirmed).await;
        assert_eq!(snap.claimed_by.as_deref(), Some("ta-alice"));

        // The TA's own backlog copy records the confirmed holder.
        let pending = ta.pending().await.expect("pending");
        assert_eq!(pending[0].claimed_by.as_deref(), Some("ta-alice"));

        // Resolution removes the request from every client.
        assert!(ta.resolve().await.expect("resolve"));
        let snap = settle(&mut student_rx, |s| s.state == RequesterState::Unsent).await;
        assert_eq!(snap.request_id, None);
        assert_eq!(snap.claimed_by, None);

        let ta_snap = settle(&mut ta_rx, |s| s.backlog_len == 0).await;
        assert_eq!(ta_snap.claim_state, ClaimState::Unclaimed);
        assert_eq!(ta_snap.active_claim, None);

        student.shutdown().await;
        ta.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_ranks_follow_arrival_and_removals_ahead() {
        let bus = bus();
        let channels = ChannelSet::default();
        let g1 = StudentClient::spawn(StudentSession::new(1), bus.clone(), &channels);
        let g2 = StudentClient::spawn(StudentSession::new(2), bus.clone(), &channels);
        let g3 = StudentClient::spawn(StudentSession::new(3), bus.clone(), &channels);

        let mut rx1 = g1.watch();
        let mut rx2 = g2.watch();
        let mut rx3 = g3.watch();

        // Spaced submissions so arrival stamps are strictly ordered.
        g1.submit(1, 0, detail("first")).await.expect("submit");
        sleep(Duration::from_millis(5)).await;
        g2.submit(1, 1, detail("second")).await.expect("submit");
        sleep(Duration::from_millis(5)).await;
        g3.submit(1, 2, detail("third")).await.expect("submit");

        settle(&mut rx1, |s| s.queue_pos == Some(1) && s.backlog_len == 3).await;
        settle(&mut rx2, |s| s.queue_pos == Some(2) && s.backlog_len == 3).await;
        settle(&mut rx3, |s| s.queue_pos == Some(3) && s.backlog_len == 3).await;

        // The front of the queue leaves: everyone behind moves up one.
        g1.cancel().await.expect("cancel");
        settle(&mut rx2, |s| s.queue_pos == Some(1)).await;
        settle(&mut rx3, |s| s.queue_pos == Some(2)).await;

        // A departure behind does not move group 2.
        g3.cancel().await.expect("cancel");
        let snap = settle(&mut rx2, |s| s.backlog_len == 1).await;
        assert_eq!(snap.queue_pos, Some(1));

        g1.shutdown().await;
        g2.shutdown().await;
        g3.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_withdraws_from_every_backlog() {
        let bus = bus();
        let channels = ChannelSet::default();
        let ta = TaClient::spawn(TaSession::new("ta-alice"), bus.clone(), &channels, ta_config());
        let student = StudentClient::spawn(StudentSession::new(8), bus.clone(), &channels);

        let mut ta_rx = ta.watch();
        let mut student_rx = student.watch();

        let id = student.submit(1, 0, detail("never mind")).await.expect("submit");
        settle(&mut ta_rx, |s| s.backlog_len == 1).await;

        student.cancel().await.expect("cancel");
        settle(&mut ta_rx, |s| s.backlog_len == 0).await;
        settle(&mut student_rx, |s| s.state == RequesterState::Unsent).await;

        // The withdrawn id can no longer be claimed.
        let err = ta.claim(id).await.unwrap_err();
        assert!(matches!(err, CoordinationError::StaleClaim { .. }));

        // The student is free to raise a fresh request.
        let next = student.submit(1, 1, detail("actually, help")).await.expect("resubmit");
        assert_ne!(next, id);
        settle(&mut ta_rx, |s| s.backlog_len == 1).await;

        student.shutdown().await;
        ta.shutdown().await;
    }
}
