//! # Backlog Registry
//!
//! Process-local map from request id to the read-derived `HelpRequest` copy,
//! rebuilt entirely from bus events. Not authoritative storage: the bus is
//! the source of truth, so insert and remove are idempotent.

use std::collections::HashMap;

use shared_types::{HelpRequest, RequestId};
use tracing::debug;

/// Per-client view of all outstanding requests.
#[derive(Debug, Default)]
pub struct Registry {
    requests: HashMap<RequestId, HelpRequest>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announced request. Duplicate announcements (retained or
    /// re-delivered) keep the first copy.
    pub fn insert(&mut self, request: HelpRequest) -> bool {
        let id = request.id;
        if self.requests.contains_key(&id) {
            debug!(%id, "duplicate announcement ignored");
            return false;
        }
        self.requests.insert(id, request);
        true
    }

    /// Forget a cancelled or resolved request. No-op for unknown ids.
    pub fn remove(&mut self, id: RequestId) -> Option<HelpRequest> {
        self.requests.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: RequestId) -> Option<&HelpRequest> {
        self.requests.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.requests.contains_key(&id)
    }

    /// Track the local view of who holds a request's confirmed claim.
    pub fn set_claimed_by(&mut self, id: RequestId, ta_name: Option<String>) {
        if let Some(request) = self.requests.get_mut(&id) {
            request.claimed_by = ta_name;
        }
    }

    /// All pending requests, oldest creation stamp first.
    #[must_use]
    pub fn pending(&self) -> Vec<&HelpRequest> {
        let mut requests: Vec<&HelpRequest> = self.requests.values().collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
