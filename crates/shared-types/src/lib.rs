//! # Shared Types Crate
//!
//! Domain entities and error taxonomy shared by the student and TA clients.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary
//!   lives here.
//! - **Bus is authoritative**: entities held by a client are reconstructions
//!   from bus events; nothing here persists beyond the session.
//! - **Explicit sessions**: logged-in identity and selection state travel in
//!   session structs owned by the client, never in ambient globals.

pub mod entities;
pub mod errors;
pub mod session;

pub use entities::*;
pub use errors::*;
pub use session::*;
