//! Cross-client integration tests over the shared bus.

pub mod claim_race;
pub mod flows;
