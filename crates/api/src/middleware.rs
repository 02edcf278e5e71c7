//! API middleware.

#![allow(missing_docs)]

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use sprintdeck_core::{Actor, Role, SessionService, SprintService};

use crate::streaming::StreamingState;

/// Caller ID header, set by the upstream gate.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Caller display name header.
pub const USER_NAME_HEADER: &str = "x-user-name";
/// Caller team role header.
pub const TEAM_ROLE_HEADER: &str = "x-team-role";

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub session_service: SessionService,
    pub sprint_service: SprintService,
    pub streaming: StreamingState,
}

/// Identity middleware.
///
/// Turns the identity headers into an [`Actor`] request extension. Requests
/// without a user ID pass through anonymous; handlers that need a caller
/// reject them.
pub async fn identity_middleware(mut req: Request<Body>, next: Next) -> Response {
    {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        if let Some(id) = header(USER_ID_HEADER) {
            let name = header(USER_NAME_HEADER).unwrap_or_else(|| id.clone());
            let role = header(TEAM_ROLE_HEADER)
                .map(|r| Role::parse(&r))
                .unwrap_or_default();
            req.extensions_mut().insert(Actor::new(id, name, role));
        }
    }

    next.run(req).await
}
