//! # Core Domain Entities
//!
//! The unit of work is the [`HelpRequest`]: created by a student group,
//! queued on the bus, claimed and resolved by a TA.
//!
//! The authoritative copy of a request lives with its requester; TA clients
//! hold read-derived copies rebuilt from bus events.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique identifier for a help request.
///
/// Generated once by the requester at creation time and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a help request, as seen by its requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RequestStatus {
    /// Constructed locally, nothing published yet.
    #[default]
    Unsent,
    /// Published on the queue channel, awaiting a claim.
    Sent,
    /// A TA's claim was accepted; `claimed_by` is set.
    Confirmed,
    /// Resolved by the claiming TA; about to be discarded.
    Completed,
}

/// A help request raised by a student group.
///
/// `id`, `group_number`, `module_number` and `task_index` are immutable after
/// creation. The free-form detail fields may be edited by the requester only
/// while the request is `Unsent` or `Sent` and not yet claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpRequest {
    /// Unique id, generated once by the requester.
    pub id: RequestId,
    /// The group asking for help.
    pub group_number: u32,
    /// The module the group is working on.
    pub module_number: u32,
    /// Zero-based task index within the module.
    pub task_index: u32,
    /// Whether the group attends remotely.
    pub is_online: bool,
    /// Meeting link for remote groups; empty when not provided.
    pub zoom_url: String,
    /// Free-form description of the problem.
    pub comment: String,
    /// Lifecycle status. Authoritative only on the requester side.
    pub status: RequestStatus,
    /// Name of the TA whose claim was confirmed, if any.
    ///
    /// Invariant: non-empty only while `status == Confirmed`.
    pub claimed_by: Option<String>,
    /// Requester-visible queue rank. Derived by the queue manager, never
    /// mutated independently.
    pub queue_pos: Option<usize>,
    /// Creation time in Unix milliseconds; fairness tie-break key.
    pub created_at: u64,
}

impl HelpRequest {
    /// Construct a new unsent request with a fresh id and timestamp.
    #[must_use]
    pub fn new(group_number: u32, module_number: u32, task_index: u32, detail: RequestDetail) -> Self {
        Self {
            id: RequestId::new(),
            group_number,
            module_number,
            task_index,
            is_online: detail.is_online,
            zoom_url: detail.zoom_url,
            comment: detail.comment,
            status: RequestStatus::Unsent,
            claimed_by: None,
            queue_pos: None,
            created_at: now_millis(),
        }
    }

    /// True while the request still occupies a queue slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status != RequestStatus::Completed
    }

    /// True while the requester may still edit the detail fields.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        matches!(self.status, RequestStatus::Unsent | RequestStatus::Sent)
            && self.claimed_by.is_none()
    }
}

/// The free-form, requester-editable part of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetail {
    /// Whether the group attends remotely.
    pub is_online: bool,
    /// Meeting link for remote groups; empty when not provided.
    pub zoom_url: String,
    /// Free-form description of the problem.
    pub comment: String,
}

/// Current Unix time in milliseconds.
///
/// Used for `created_at` stamps; equal stamps fall back to insertion order.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
