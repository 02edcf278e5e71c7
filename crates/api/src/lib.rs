//! HTTP API layer for sprintdeck.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: planning sessions and sprint boards
//! - **Extractors**: caller identity
//! - **Middleware**: identity headers from the upstream gate
//! - **Streaming**: WebSocket and Server-Sent Events
//!
//! Built on Axum 0.8.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;
pub mod streaming;

pub use endpoints::router;
pub use middleware::{AppState, identity_middleware};
pub use streaming::{StreamingState, streaming_handler};
