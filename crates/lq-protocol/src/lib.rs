//! # Wire Protocol Codec
//!
//! Every message on every channel is a JSON [`Envelope`] carrying a
//! request-type tag and a type-specific flat record. The tag values are
//! stable wire constants; the records round-trip through [`encode`] and
//! [`Envelope::payload`].
//!
//! Decoding failures are [`CodecError::MalformedEnvelope`]; callers treat
//! them as drop-and-log, never fatal.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod envelope;
pub mod payloads;

pub use envelope::{decode, encode, CodecError, Envelope, MessageType};
pub use payloads::{
    AddRequestPayload, CancelClaimPayload, CancelRequestPayload, ClaimRequestPayload,
    ConfirmClaimPayload, FeedbackPayload, ResolveRequestPayload,
};
