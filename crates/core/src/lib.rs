//! Core domain logic for sprintdeck.
//!
//! Pure engines operate on in-memory documents:
//!
//! - [`voting`]: the per-story round state machine
//! - [`consensus`]: session statistics
//! - [`reconciliation`]: sprint completion and cancellation planning
//! - [`access`]: role to capability resolution
//!
//! [`services`] wrap them with persistence through the [`store`] traits,
//! compare-and-swap retries and real-time publishing.

pub mod access;
pub mod board;
pub mod consensus;
pub mod deck;
pub mod model;
pub mod reconciliation;
pub mod retry;
pub mod roster;
pub mod services;
pub mod store;
pub mod voting;

pub use access::{Actor, Capabilities, Capability, Role};
pub use deck::Deck;
pub use retry::CasPolicy;
pub use services::*;
