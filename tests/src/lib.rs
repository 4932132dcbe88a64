//! # LabQueue Test Suite
//!
//! Unified test crate exercising the coordination stack across client
//! boundaries: several student and TA clients on one in-memory bus.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs       # Submit/claim/confirm/resolve round trips
//!     └── claim_race.rs  # Competing claims, releases, timeouts
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p lq-tests
//!
//! # By category
//! cargo test -p lq-tests integration::flows
//! cargo test -p lq-tests integration::claim_race
//! ```

pub mod integration;
