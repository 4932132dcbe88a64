//! # Lab Session Runtime
//!
//! Entry point wiring the coordination stack together over the in-memory
//! bus: one TA client and two student-group clients share a channel set and
//! walk a full help-request round.
//!
//! ```text
//!   group 7 ──AddRequest──► queue ◄──AddRequest── group 12
//!                             │
//!            ta-alice ──ClaimRequest──► queue
//!                             │
//!   group 7 ──ConfirmClaim──► queue   (first claim wins)
//!                             │
//!            ta-alice ──ResolveRequest──► queue
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging
//! 2. Load configuration from environment
//! 3. Create the shared bus and channel set
//! 4. Spawn the TA and student clients
//! 5. Drive one scripted session round
//! 6. Shut every client down

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lq_requester::{RequesterState, StudentClient};
use lq_responder::{ClaimState, ResponderConfig, TaClient, DEFAULT_CLAIM_WAIT};
use shared_bus::{BusAdapter, ChannelSet, InMemoryBus, DEFAULT_CHANNEL_CAPACITY};
use shared_types::{RequestDetail, StudentSession, TaSession};

/// How long any single scripted step may take before the run is aborted.
const STEP_DEADLINE: Duration = Duration::from_secs(5);

/// Runtime configuration for one session.
#[derive(Debug, Clone)]
struct SessionConfig {
    /// Channel namespace shared by every client in the session.
    channel_base: String,
    /// Per-channel broadcast capacity of the in-memory bus.
    bus_capacity: usize,
    /// Claim-wait window handed to the TA client.
    claim_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_base: shared_bus::DEFAULT_BASE.to_owned(),
            bus_capacity: DEFAULT_CHANNEL_CAPACITY,
            claim_wait: DEFAULT_CLAIM_WAIT,
        }
    }
}

fn load_config() -> SessionConfig {
    let mut config = SessionConfig::default();

    if let Ok(base) = std::env::var("LQ_CHANNEL_BASE") {
        if !base.is_empty() {
            config.channel_base = base;
        }
    }
    if let Ok(capacity) = std::env::var("LQ_BUS_CAPACITY") {
        if let Ok(c) = capacity.parse() {
            config.bus_capacity = c;
        }
    }
    if let Ok(wait_ms) = std::env::var("LQ_CLAIM_WAIT_MS") {
        if let Ok(ms) = wait_ms.parse() {
            config.claim_wait = Duration::from_millis(ms);
        }
    }

    config
}

/// Wait until a client's snapshot satisfies `pred`, within [`STEP_DEADLINE`].
async fn settle<T, F>(rx: &mut watch::Receiver<T>, what: &str, mut pred: F) -> Result<T>
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    timeout(STEP_DEADLINE, async {
        loop {
            if pred(&rx.borrow()) {
                return Ok(rx.borrow().clone());
            }
            rx.changed().await.context("snapshot channel closed")?;
        }
    })
    .await
    .with_context(|| format!("timed out waiting for {what}"))?
}

async fn run_session(config: SessionConfig) -> Result<()> {
    let bus: Arc<dyn BusAdapter> = Arc::new(InMemoryBus::with_capacity(config.bus_capacity));
    let channels = ChannelSet::with_base(config.channel_base.clone());

    let ta = TaClient::spawn(
        TaSession::new("ta-alice"),
        bus.clone(),
        &channels,
        ResponderConfig {
            claim_wait: config.claim_wait,
        },
    );
    let group7 = StudentClient::spawn(StudentSession::new(7), bus.clone(), &channels);
    let group12 = StudentClient::spawn(StudentSession::new(12), bus.clone(), &channels);

    let mut ta_rx = ta.watch();
    let mut g7_rx = group7.watch();
    let mut g12_rx = group12.watch();

    // Both groups raise a request on the shared queue channel.
    let first = group7
        .submit(
            1,
            2,
            RequestDetail {
                is_online: false,
                zoom_url: String::new(),
                comment: "assertion fails on step 4".into(),
            },
        )
        .await?;
    info!(%first, group = 7, "request submitted");

    let second = group12
        .submit(
            1,
            0,
            RequestDetail {
                is_online: true,
                zoom_url: "https://zoom.example/lab12".into(),
                comment: "setup script hangs".into(),
            },
        )
        .await?;
    info!(%second, group = 12, "request submitted");

    settle(&mut ta_rx, "TA backlog to fill", |s| s.backlog_len == 2).await?;
    let pending = ta.pending().await?;
    for request in &pending {
        info!(id = %request.id, group = request.group_number, "pending request");
    }

    // Queue positions as each group sees them, oldest first.
    let g7 = settle(&mut g7_rx, "group 7 queue rank", |s| s.queue_pos.is_some()).await?;
    let g12 = settle(&mut g12_rx, "group 12 queue rank", |s| s.queue_pos.is_some()).await?;
    info!(group7_pos = ?g7.queue_pos, group12_pos = ?g12.queue_pos, "queue ranks");

    // The TA claims the oldest request; its requester confirms the first
    // claim it sees, so the claim lands without further driving.
    ta.claim(first).await?;
    let snap = settle(&mut ta_rx, "claim confirmation", |s| {
        s.claim_state == ClaimState::Claimed
    })
    .await?;
    info!(id = ?snap.active_claim, "claim confirmed");

    settle(&mut g7_rx, "group 7 to see the confirm", |s| {
        s.state == RequesterState::Confirmed
    })
    .await?;

    // Resolving removes the request everywhere; group 12 moves to the front.
    ta.resolve().await?;
    settle(&mut g7_rx, "group 7 completion", |s| {
        s.state == RequesterState::Unsent
    })
    .await?;
    let g12 = settle(&mut g12_rx, "group 12 to move up", |s| s.queue_pos == Some(1)).await?;
    info!(group = 12, pos = ?g12.queue_pos, "queue ranks after resolve");

    // The remaining group withdraws and the session winds down empty.
    group12.cancel().await?;
    settle(&mut ta_rx, "TA backlog to drain", |s| s.backlog_len == 0).await?;
    info!("session round complete");

    group7.shutdown().await;
    group12.shutdown().await;
    ta.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config();
    info!(
        base = %config.channel_base,
        capacity = config.bus_capacity,
        claim_wait_ms = config.claim_wait.as_millis() as u64,
        "starting lab session runtime"
    );

    run_session(config).await
}
