//! # Responder (TA) Side
//!
//! A TA client observes every pending help request, bids for one with a
//! claim, and either wins (the requester confirms) or loses silently and
//! recovers through the claim-wait timeout.
//!
//! ```text
//!               claim                    sig: ConfirmClaim (for self)
//!   Unclaimed ─────────► Waiting ─────────────────────────► Claimed
//!       ▲                  │ │                                 │
//!       │   timeout (500)  │ │        cancel_claim             │
//!       ├──────────────────┘ └────────────────────────────┐    │
//!       │                 resolve / cancel_claim          │    │
//!       └─────────────────────────────────────────────────┴────┘
//! ```
//!
//! There is no claim-rejection message: a losing claim leaves `Waiting`
//! only when its timer fires.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod arbitrator;
pub mod client;
pub mod registry;

pub use arbitrator::{ClaimArbitrator, ClaimState};
pub use client::{ResponderConfig, ResponderSnapshot, TaClient, DEFAULT_CLAIM_WAIT};
pub use registry::Registry;
