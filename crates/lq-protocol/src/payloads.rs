//! # Message Records
//!
//! One flat record per request type. `AddRequest` carries the full
//! `HelpRequest` minus `status` and `queue_pos` (both derived locally by
//! each receiver); everything else is a small addressing record.

use serde::{Deserialize, Serialize};
use shared_types::{HelpRequest, RequestId, RequestStatus};

/// Full request detail announced to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequestPayload {
    pub id: RequestId,
    pub group_number: u32,
    pub module_number: u32,
    pub task_index: u32,
    pub is_online: bool,
    pub zoom_url: String,
    pub comment: String,
    pub created_at: u64,
}

impl From<&HelpRequest> for AddRequestPayload {
    fn from(req: &HelpRequest) -> Self {
        Self {
            id: req.id,
            group_number: req.group_number,
            module_number: req.module_number,
            task_index: req.task_index,
            is_online: req.is_online,
            zoom_url: req.zoom_url.clone(),
            comment: req.comment.clone(),
            created_at: req.created_at,
        }
    }
}

impl AddRequestPayload {
    /// Rebuild the receiver-side copy of the request.
    ///
    /// Status starts at `Sent` (the announcement is the send) and the derived
    /// fields start empty.
    #[must_use]
    pub fn into_request(self) -> HelpRequest {
        HelpRequest {
            id: self.id,
            group_number: self.group_number,
            module_number: self.module_number,
            task_index: self.task_index,
            is_online: self.is_online,
            zoom_url: self.zoom_url,
            comment: self.comment,
            status: RequestStatus::Sent,
            claimed_by: None,
            queue_pos: None,
            created_at: self.created_at,
        }
    }
}

/// Withdraw a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequestPayload {
    pub id: RequestId,
}

/// A TA's bid to serve a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequestPayload {
    pub id: RequestId,
    pub ta_name: String,
}

/// The requester's acceptance of a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmClaimPayload {
    pub ta_name: String,
}

/// Release a claimed (or still-pending) request back to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelClaimPayload {
    pub id: RequestId,
}

/// Mark a claimed request complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequestPayload {
    pub id: RequestId,
}

/// Task feedback submission. Carried for wire completeness; feedback storage
/// and display live outside the coordination core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub group_number: u32,
    pub module_number: u32,
    pub task_number: u32,
    pub difficulty: String,
    pub comment: String,
}
