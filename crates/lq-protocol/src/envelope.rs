//! # Message Envelope
//!
//! `{ request_type: int, data: <record> }`, JSON-encoded. The integer tags
//! are wire constants shared by every client generation; renumbering them is
//! a protocol break.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from envelope encoding and decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The type tag is absent/unknown or the data does not parse into the
    /// expected record shape. Drop and log; never fatal.
    #[error("Malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    /// A well-formed input failed to serialize. Not expected in practice.
    #[error("Envelope encoding failed: {0}")]
    Encode(String),
}

/// Request-type tag carried by every envelope.
///
/// Discriminants are the stable wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    /// A requester places a new help request in the queue.
    AddRequest = 0,
    /// A requester withdraws its pending request.
    CancelRequest = 1,
    /// A TA bids to serve a specific request.
    ClaimRequest = 2,
    /// The requester accepts exactly one TA's claim.
    ConfirmClaim = 3,
    /// The claiming TA releases the request back to the queue.
    CancelClaim = 4,
    /// The claiming TA marks the request complete.
    ResolveRequest = 5,
    /// A group submits task feedback (outside the coordination core).
    SendFeedback = 6,
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        kind as Self
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::AddRequest),
            1 => Ok(Self::CancelRequest),
            2 => Ok(Self::ClaimRequest),
            3 => Ok(Self::ConfirmClaim),
            4 => Ok(Self::CancelClaim),
            5 => Ok(Self::ResolveRequest),
            6 => Ok(Self::SendFeedback),
            other => Err(format!("unknown request type tag {other}")),
        }
    }
}

/// The universal wrapper for every channel message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Request-type tag selecting the record shape in `data`.
    pub request_type: MessageType,
    /// Type-specific flat record.
    pub data: serde_json::Value,
}

impl Envelope {
    /// Wrap a payload record under a request-type tag.
    pub fn new<T: Serialize>(request_type: MessageType, payload: &T) -> Result<Self, CodecError> {
        let data = serde_json::to_value(payload).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Self { request_type, data })
    }

    /// Parse the data record into its typed shape.
    pub fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, CodecError> {
        serde_json::from_value(self.data.clone()).map_err(|e| CodecError::MalformedEnvelope {
            reason: format!("bad {:?} record: {e}", self.request_type),
        })
    }
}

/// Encode a typed payload into envelope bytes.
///
/// Never fails for well-formed inputs.
pub fn encode<T: Serialize>(request_type: MessageType, payload: &T) -> Result<Vec<u8>, CodecError> {
    let envelope = Envelope::new(request_type, payload)?;
    serde_json::to_vec(&envelope).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode envelope bytes into the tag and data record.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::MalformedEnvelope {
        reason: e.to_string(),
    })
}
