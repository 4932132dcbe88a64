//! # Student Client Actor
//!
//! One logical actor per student group. A listener task decodes bus
//! envelopes into triggers and forwards them through the same command queue
//! the UI uses, so no two triggers for the lifecycle ever run concurrently.
//! UI-facing calls reply over oneshot channels; observers follow a watch
//! channel snapshot instead of polling the machine.

use std::sync::Arc;

use lq_protocol::decode;
use shared_bus::{BusAdapter, ChannelSet};
use shared_types::{CoordinationError, RequestDetail, RequestId, StudentSession};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::lifecycle::{RequestLifecycle, RequesterState};

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Observer-facing view of the requester, refreshed after every trigger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequesterSnapshot {
    pub state: RequesterState,
    /// Id of the outstanding request, if any.
    pub request_id: Option<RequestId>,
    /// Own rank among earlier-arrived pending requests.
    pub queue_pos: Option<usize>,
    /// Size of the whole backlog as observed on the bus.
    pub backlog_len: usize,
    /// TA whose claim we confirmed, if any.
    pub claimed_by: Option<String>,
}

enum Command {
    Submit {
        module_number: u32,
        task_index: u32,
        detail: RequestDetail,
        reply: oneshot::Sender<Result<RequestId, CoordinationError>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<(), CoordinationError>>,
    },
    EditDetails {
        detail: RequestDetail,
        reply: oneshot::Sender<bool>,
    },
    Bus(lq_protocol::Envelope),
    Shutdown,
}

/// Handle to a running student client.
pub struct StudentClient {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<RequesterSnapshot>,
    dispatcher: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl StudentClient {
    /// Spawn the dispatcher and bus listener for one student group.
    #[must_use]
    pub fn spawn(
        session: StudentSession,
        bus: Arc<dyn BusAdapter>,
        channels: &ChannelSet,
    ) -> Self {
        let lifecycle = RequestLifecycle::new(session, bus.clone(), channels);
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (snapshot_tx, snapshot) = watch::channel(RequesterSnapshot::default());

        let listener = spawn_listener(bus, channels.queue(), commands.clone());
        let dispatcher = tokio::spawn(dispatch(lifecycle, rx, snapshot_tx));

        Self {
            commands,
            snapshot,
            dispatcher,
            listener,
        }
    }

    /// Submit a help request for the session's group.
    pub async fn submit(
        &self,
        module_number: u32,
        task_index: u32,
        detail: RequestDetail,
    ) -> Result<RequestId, CoordinationError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                module_number,
                task_index,
                detail,
                reply,
            })
            .await
            .map_err(|_| CoordinationError::ClientClosed)?;
        response.await.map_err(|_| CoordinationError::ClientClosed)?
    }

    /// Withdraw the outstanding request.
    pub async fn cancel(&self) -> Result<(), CoordinationError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Cancel { reply })
            .await
            .map_err(|_| CoordinationError::ClientClosed)?;
        response.await.map_err(|_| CoordinationError::ClientClosed)?
    }

    /// Edit the outstanding request's free-form detail; returns whether the
    /// edit was applied.
    pub async fn edit_details(&self, detail: RequestDetail) -> Result<bool, CoordinationError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::EditDetails { detail, reply })
            .await
            .map_err(|_| CoordinationError::ClientClosed)?;
        response.await.map_err(|_| CoordinationError::ClientClosed)
    }

    /// Current snapshot of the requester's state.
    #[must_use]
    pub fn snapshot(&self) -> RequesterSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch channel carrying a fresh snapshot after every handled trigger.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<RequesterSnapshot> {
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
                    // Malformed traffic is dropped, never fatal.
                    warn!(%err, channel, "dropping malformed envelope");
                    continue;
                }
            };
            if commands.send(Command::Bus(envelope)).await.is_err() {
                break; // dispatcher gone
            }
        }
        debug!(channel, "bus listener stopped");
    })
}

async fn dispatch(
    mut lifecycle: RequestLifecycle,
    mut rx: mpsc::Receiver<Command>,
    snapshot: watch::Sender<RequesterSnapshot>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Submit {
                module_number,
                task_index,
                detail,
                reply,
            } => {
                let result = lifecycle.submit(module_number, task_index, detail).await;
                let _ = reply.send(result);
            }
            Command::Cancel { reply } => {
                let _ = reply.send(lifecycle.cancel().await);
            }
            Command::EditDetails { detail, reply } => {
                let _ = reply.send(lifecycle.edit_details(detail));
            }
            Command::Bus(envelope) => lifecycle.on_envelope(&envelope).await,
            Command::Shutdown => break,
        }
        let _ = snapshot.send(snapshot_of(&lifecycle));
    }
    debug!("requester dispatcher stopped");
}

fn snapshot_of(lifecycle: &RequestLifecycle) -> RequesterSnapshot {
    let (backlog_len, queue_pos) = lifecycle.queue_positions();
    RequesterSnapshot {
        state: lifecycle.state(),
        request_id: lifecycle.request().map(|r| r.id),
        queue_pos,
        backlog_len,
        claimed_by: lifecycle.request().and_then(|r| r.claimed_by.clone()),
    }
}
