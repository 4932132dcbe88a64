//! # Queue Manager
//!
//! Ordered backlog of outstanding help requests plus the position
//! bookkeeping that lets a requester see where it stands.
//!
//! The requester cares only about its rank relative to earlier arrivals, not
//! raw list size: `local_position` is decremented only when an entry ahead of
//! the active request leaves the queue, and ignores removals behind it.
//!
//! All operations are idempotent under the duplicate and out-of-order
//! delivery the bus is allowed to produce.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

use shared_types::RequestId;
use tracing::debug;

/// One backlog entry: a request id and its fairness key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: RequestId,
    pub created_at: u64,
}

/// Per-client view of the session-wide request queue.
///
/// Every client feeds it the add/cancel/resolve events it observes on the
/// bus; `active_request`/`local_position` are only meaningful on the
/// requester side, for the single request this client owns.
#[derive(Debug, Default)]
pub struct QueueManager {
    entries: Vec<QueueEntry>,
    global_position: usize,
    local_position: Option<usize>,
    active_request: Option<QueueEntry>,
}

impl QueueManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A request was announced on the bus.
    ///
    /// No-op if `id` is already queued (duplicate or retained delivery).
    /// When `is_mine`, the entry becomes the active request and its rank at
    /// insertion time becomes the local position.
    pub fn on_add(&mut self, id: RequestId, created_at: u64, is_mine: bool) {
        if self.contains(id) {
            debug!(%id, "duplicate add ignored");
            return;
        }
        self.entries.push(QueueEntry { id, created_at });
        self.global_position += 1;
        if is_mine {
            self.active_request = Some(QueueEntry { id, created_at });
            self.local_position = Some(self.global_position);
        }
        debug!(%id, global = self.global_position, local = ?self.local_position, "request queued");
    }

    /// A request left the queue (withdrawn by its requester).
    ///
    /// No-op for unknown ids. Removing the active request clears the local
    /// bookkeeping; removing an entry that arrived strictly before the active
    /// request moves the local position up by one.
    pub fn on_cancel(&mut self, id: RequestId) {
        let Some(idx) = self.entries.iter().position(|e| e.id == id) else {
            debug!(%id, "cancel/resolve for unqueued request ignored");
            return;
        };
        let removed = self.entries.remove(idx);
        self.global_position -= 1;

        let is_mine = self.active_request.map(|a| a.id) == Some(id);
        if is_mine {
            self.active_request = None;
            self.local_position = None;
        } else if let Some(active) = self.active_request {
            if removed.created_at < active.created_at {
                // An entry ahead in line left; removals behind us are ignored.
                self.local_position = self.local_position.map(|p| p.saturating_sub(1));
            }
        }
        debug!(%id, global = self.global_position, local = ?self.local_position, "request dequeued");
    }

    /// A request was resolved by a TA. Identical effect to a cancel.
    pub fn on_resolve(&mut self, id: RequestId) {
        self.on_cancel(id);
    }

    /// Whether `id` is currently queued.
    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Number of requests currently awaiting service.
    #[must_use]
    pub fn global_position(&self) -> usize {
        self.global_position
    }

    /// Rank of this client's own request among earlier arrivals, if one is
    /// outstanding.
    #[must_use]
    pub fn local_position(&self) -> Option<usize> {
        self.local_position
    }

    /// The entry for this client's own request, if one is outstanding.
    #[must_use]
    pub fn active_request(&self) -> Option<QueueEntry> {
        self.active_request
    }
}
