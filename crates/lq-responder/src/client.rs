//! # TA Client Actor
//!
//! Mirror of the student client: one dispatcher task owns the registry, the
//! queue manager, and the claim arbitrators; a listener task feeds decoded
//! bus envelopes through the same command queue as the operator's claim,
//! cancel and resolve actions.
//!
//! The claim-wait timer is a plain sleep task posting a timeout trigger
//! tagged with the claim generation; stale triggers no-op inside the
//! arbitrator, so nothing needs aborting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lq_protocol::{
    decode, AddRequestPayload, CancelClaimPayload, CancelRequestPayload, ConfirmClaimPayload,
    Envelope, MessageType, ResolveRequestPayload,
};
use lq_queue::QueueManager;
use shared_bus::{BusAdapter, ChannelSet};
use shared_types::{CoordinationError, HelpRequest, RequestId, TaSession};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::arbitrator::{ClaimArbitrator, ClaimState};
use crate::registry::Registry;

const COMMAND_QUEUE_DEPTH: usize = 64;

/// How long a published claim waits for the requester's confirm before the
/// arbitrator gives up (another TA's claim was accepted first).
pub const DEFAULT_CLAIM_WAIT: Duration = Duration::from_millis(500);

/// Tunables for a TA client.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Claim-wait window before an unconfirmed claim is abandoned.
    pub claim_wait: Duration,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            claim_wait: DEFAULT_CLAIM_WAIT,
        }
    }
}

/// Observer-facing view of the TA client, refreshed after every trigger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponderSnapshot {
    /// State of the in-flight claim, `Unclaimed` when there is none.
    pub claim_state: ClaimState,
    /// Request the in-flight claim is for.
    pub active_claim: Option<RequestId>,
    /// Number of requests in the local backlog view.
    pub backlog_len: usize,
}

enum Command {
    Claim {
        id: RequestId,
        reply: oneshot::Sender<Result<(), CoordinationError>>,
    },
    CancelClaim {
        reply: oneshot::Sender<Result<bool, CoordinationError>>,
    },
    Resolve {
        reply: oneshot::Sender<Result<bool, CoordinationError>>,
    },
    Pending {
        reply: oneshot::Sender<Vec<HelpRequest>>,
    },
    Bus(Envelope),
    ClaimTimeout { id: RequestId, generation: u64 },
    Shutdown,
}

/// Handle to a running TA client.
pub struct TaClient {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<ResponderSnapshot>,
    dispatcher: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl TaClient {
    /// Spawn the dispatcher and bus listener for one TA.
    #[must_use]
    pub fn spawn(
        session: TaSession,
        bus: Arc<dyn BusAdapter>,
        channels: &ChannelSet,
        config: ResponderConfig,
    ) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (snapshot_tx, snapshot) = watch::channel(ResponderSnapshot::default());

        let listener = spawn_listener(bus.clone(), channels.queue(), commands.clone());
        let dispatcher = Dispatcher {
            session,
            bus,
            channels: channels.clone(),
            config,
            registry: Registry::new(),
            queue: QueueManager::new(),
            arbitrators: HashMap::new(),
            active_claim: None,
            commands: commands.clone(),
        };
        let dispatcher = tokio::spawn(dispatcher.run(rx, snapshot_tx));

        Self {
            commands,
            snapshot,
            dispatcher,
            listener,
        }
    }

    /// Bid to serve a request. At most one claim may be in flight.
    pub async fn claim(&self, id: RequestId) -> Result<(), CoordinationError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Claim { id, reply })
            .await
            .map_err(|_| CoordinationError::ClientClosed)?;
        response.await.map_err(|_| CoordinationError::ClientClosed)?
    }

    /// Abort or release the in-flight claim; returns whether a release was
    /// actually published.
    pub async fn cancel_claim(&self) -> Result<bool, CoordinationError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::CancelClaim { reply })
            .await
            .map_err(|_| CoordinationError::ClientClosed)?;
        response.await.map_err(|_| CoordinationError::ClientClosed)?
    }

    /// Mark the claimed request complete; returns whether a resolution was
    /// actually published.
    pub async fn resolve(&self) -> Result<bool, CoordinationError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Resolve { reply })
            .await
            .map_err(|_| CoordinationError::ClientClosed)?;
        response.await.map_err(|_| CoordinationError::ClientClosed)?
    }

    /// Snapshot of the pending backlog, oldest first.
    pub async fn pending(&self) -> Result<Vec<HelpRequest>, CoordinationError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Pending { reply })
            .await
            .map_err(|_| CoordinationError::ClientClosed)?;
        response.await.map_err(|_| CoordinationError::ClientClosed)
    }

    /// Current snapshot of the responder's state.
    #[must_use]
    pub fn snapshot(&self) -> ResponderSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch channel carrying a fresh snapshot after every handled trigger.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ResponderSnapshot> {
        self.snapshot.clone()
    }

    /// Stop both tasks and wait for the dispatcher to drain.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = self.dispatcher.await;
        self.listener.abort();
    }
}

fn spawn_listener(
    bus: Arc<dyn BusAdapter>,
    channel: String,
    commands: mpsc::Sender<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut subscription = bus.subscribe(&channel);
        while let Some(bytes) = subscription.recv().await {
            let envelope = match decode(&bytes) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(%err, channel, "dropping malformed envelope");
                    continue;
                }
            };
            if commands.send(Command::Bus(envelope)).await.is_err() {
                break;
            }
        }
        debug!(channel, "bus listener stopped");
    })
}

struct Dispatcher {
    session: TaSession,
    bus: Arc<dyn BusAdapter>,
    channels: ChannelSet,
    config: ResponderConfig,
    registry: Registry,
    queue: QueueManager,
    /// One arbitrator per request this TA has interacted with.
    arbitrators: HashMap<RequestId, ClaimArbitrator>,
    /// The single claim currently pending or held.
    active_claim: Option<RequestId>,
    commands: mpsc::Sender<Command>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Command>,
        snapshot: watch::Sender<ResponderSnapshot>,
    ) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Claim { id, reply } => {
                    let _ = reply.send(self.handle_claim(id).await);
                }
                Command::CancelClaim { reply } => {
                    let _ = reply.send(self.handle_cancel_claim().await);
                }
                Command::Resolve { reply } => {
                    let _ = reply.send(self.handle_resolve().await);
                }
                Command::Pending { reply } => {
                    let pending = self.registry.pending().into_iter().cloned().collect();
                    let _ = reply.send(pending);
                }
                Command::Bus(envelope) => self.handle_envelope(&envelope),
                Command::ClaimTimeout { id, generation } => {
                    self.handle_claim_timeout(id, generation);
                }
                Command::Shutdown => break,
            }
            let _ = snapshot.send(self.snapshot());
        }
        debug!("responder dispatcher stopped");
    }

    fn snapshot(&self) -> ResponderSnapshot {
        let claim_state = self
            .active_claim
            .and_then(|id| self.arbitrators.get(&id))
            .map_or(ClaimState::Unclaimed, ClaimArbitrator::state);
        ResponderSnapshot {
            claim_state,
            active_claim: self.active_claim,
            backlog_len: self.registry.len(),
        }
    }

    /// `claim_button`: publish a bid for `id` and start the claim-wait timer.
    async fn handle_claim(&mut self, id: RequestId) -> Result<(), CoordinationError> {
        if let Some(active) = self.active_claim {
            return Err(CoordinationError::ClaimPending { id: active });
        }
        if !self.registry.contains(id) {
            return Err(CoordinationError::StaleClaim { id });
        }

        let arbitrator = self.arbitrators.entry(id).or_insert_with(|| {
            ClaimArbitrator::new(id, self.session.ta_name.clone(), self.bus.clone(), &self.channels)
        });
        let generation = arbitrator.claim().await?;
        self.active_claim = Some(id);

        let commands = self.commands.clone();
        let wait = self.config.claim_wait;
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = commands.send(Command::ClaimTimeout { id, generation }).await;
        });
        Ok(())
    }

    async fn handle_cancel_claim(&mut self) -> Result<bool, CoordinationError> {
        let Some(id) = self.active_claim else {
            return Ok(false);
        };
        let Some(arbitrator) = self.arbitrators.get_mut(&id) else {
            self.active_claim = None;
            return Ok(false);
        };
        let released = arbitrator.cancel_claim().await?;
        self.registry.set_claimed_by(id, None);
        self.active_claim = None;
        Ok(released)
    }

    async fn handle_resolve(&mut self) -> Result<bool, CoordinationError> {
        let Some(id) = self.active_claim else {
            return Ok(false);
        };
        let Some(arbitrator) = self.arbitrators.get_mut(&id) else {
            self.active_claim = None;
            return Ok(false);
        };
        let resolved = arbitrator.resolve().await?;
        if resolved {
            // Registry removal follows from our own resolve looping back.
            self.active_claim = None;
        }
        Ok(resolved)
    }

    fn handle_claim_timeout(&mut self, id: RequestId, generation: u64) {
        if let Some(arbitrator) = self.arbitrators.get_mut(&id) {
            if arbitrator.on_timeout(generation) && self.active_claim == Some(id) {
                self.active_claim = None;
            }
        }
    }

    fn handle_envelope(&mut self, envelope: &Envelope) {
        match envelope.request_type {
            MessageType::AddRequest => match envelope.payload::<AddRequestPayload>() {
                Ok(payload) => self.on_add(payload),
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
            MessageType::ConfirmClaim => match envelope.payload::<ConfirmClaimPayload>() {
                Ok(payload) => self.on_confirm(&payload.ta_name),
                Err(err) => warn!(%err, "dropping confirm record"),
            },
            MessageType::CancelClaim => match envelope.payload::<CancelClaimPayload>() {
                Ok(payload) => {
                    // A release (ours looping back, or another TA's) puts the
                    // request back up for grabs in the local view.
                    self.registry.set_claimed_by(payload.id, None);
                }
                Err(err) => warn!(%err, "dropping cancel-claim record"),
            },
            MessageType::ClaimRequest => {
                // Other TAs' bids are not tracked: the requester is the sole
                // arbiter and our own pending claim recovers via timeout.
                debug!("claim traffic observed, ignored");
            }
            MessageType::SendFeedback => {
                debug!("feedback traffic is outside the coordination core");
            }
        }
    }

    fn on_add(&mut self, payload: AddRequestPayload) {
        let request = payload.into_request();
        let id = request.id;
        let group = request.group_number;
        let created_at = request.created_at;
        if self.registry.insert(request) {
            info!(%id, group, "new help request in backlog");
        }
        self.queue.on_add(id, created_at, false);
    }

    fn on_remove(&mut self, id: RequestId) {
        self.queue.on_cancel(id);
        if self.registry.remove(id).is_some() {
            info!(%id, "request left the backlog");
        }
        if let Some(mut arbitrator) = self.arbitrators.remove(&id) {
            arbitrator.reset();
        }
        if self.active_claim == Some(id) {
            self.active_claim = None;
        }
    }

    fn on_confirm(&mut self, ta_name: &str) {
        if ta_name != self.session.ta_name {
            debug!(ta = %ta_name, "confirm for another TA, ignored");
            return;
        }
        let Some(id) = self.active_claim else {
            // Confirm for us with no claim in flight: stale, ignored.
            debug!("stale confirm, no claim in flight");
            return;
        };
        if let Some(arbitrator) = self.arbitrators.get_mut(&id) {
            if arbitrator.on_confirm(ta_name) {
                self.registry.set_claimed_by(id, Some(ta_name.to_owned()));
            }
        }
    }
}
