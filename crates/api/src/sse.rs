//! Server-Sent Events (SSE) for real-time updates.
//!
//! One stream per document: the current state first, then every committed
//! change to it.

#![allow(missing_docs)]

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::stream::{self, Stream};
use sprintdeck_common::AppResult;
use sprintdeck_core::{StreamEvent, Topic};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::error;

use crate::middleware::AppState;
use crate::streaming::{LatestOnly, Subscription, snapshot};

fn to_event(event: &StreamEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode SSE event");
        Event::default().event("error").data("encoding failed")
    })
}

/// Document SSE stream.
async fn document_stream(
    Path((kind, id)): Path<(Topic, String)>,
    State(state): State<AppState>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before loading so no commit falls between the two
    let rx = state.streaming.subscribe();
    let subscription = Subscription { kind, id };
    let current = snapshot(&state, &subscription).await?;
    let mut latest = LatestOnly::default();
    latest.admit(&current);

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        result
            .ok()
            .filter(|event| {
                let (topic, doc_id) = event.topic();
                topic == subscription.kind && doc_id == subscription.id && latest.admit(event)
            })
            .map(|event| Ok(to_event(&event)))
    });

    let initial = stream::once(async move { Ok(to_event(&current)) });

    Ok(Sse::new(initial.chain(stream)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    ))
}

/// Create SSE router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{kind}/{id}", get(document_stream))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_carries_json_document() {
        let event = to_event(&StreamEvent::SessionClosed {
            session_id: "s1".to_string(),
        });

        let rendered = format!("{event:?}");
        assert!(rendered.contains("sessionClosed"));
    }
}
