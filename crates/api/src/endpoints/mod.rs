//! API endpoints.

mod sessions;
mod sprints;

use axum::Router;

use crate::middleware::AppState;
use crate::sse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/sessions", sessions::router())
        .nest("/sprints", sprints::router())
        .nest("/streaming/sse", sse::router())
}
