//! # Requester Side
//!
//! The state machine a student client runs for its single allowed
//! outstanding help request, plus the client actor that feeds it.
//!
//! ```text
//!            submit                 sig: ClaimRequest (own, unclaimed)
//!   Unsent ─────────► Sent ─────────────────────────► Confirmed
//!     ▲                │ ▲                                │
//!     │     cancel     │ │        sig: CancelClaim        │
//!     └────────────────┘ └────────────────────────────────┤
//!     ▲                                                   │
//!     │               sig: ResolveRequest                 │
//!     └───────────────────────────────────────────────────┘
//! ```
//!
//! Every transition that publishes is gated on the bus accepting the
//! message: on a refused publish the machine stays put and the caller is
//! told the action did not take effect.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod client;
pub mod lifecycle;

pub use client::{RequesterSnapshot, StudentClient};
pub use lifecycle::{RequestLifecycle, RequesterState};
