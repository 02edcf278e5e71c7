//! Event publisher service.
//!
//! Services publish the full document after every committed change. The
//! real-time fan-out lives in the API crate; core only sees this trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sprintdeck_common::AppResult;

use crate::model::{SessionAggregate, Sprint};

/// Kind of document a subscriber follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Session,
    Sprint,
}

/// Event delivered to real-time subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum StreamEvent {
    /// Full session document after a change.
    SessionUpdated(SessionAggregate),
    /// Full sprint document after a change.
    SprintUpdated(Sprint),
    /// The session was ended; subscribers should disconnect.
    #[serde(rename_all = "camelCase")]
    SessionClosed { session_id: String },
}

impl StreamEvent {
    /// Topic and document ID this event belongs to.
    #[must_use]
    pub fn topic(&self) -> (Topic, &str) {
        match self {
            Self::SessionUpdated(doc) => (Topic::Session, &doc.id),
            Self::SprintUpdated(doc) => (Topic::Sprint, &doc.id),
            Self::SessionClosed { session_id } => (Topic::Session, session_id),
        }
    }

    /// Version of the carried document. Commits may be published out of
    /// order, so consumers drop documents older than one already seen.
    #[must_use]
    pub const fn version(&self) -> Option<i64> {
        match self {
            Self::SessionUpdated(doc) => Some(doc.version),
            Self::SprintUpdated(doc) => Some(doc.version),
            Self::SessionClosed { .. } => None,
        }
    }
}

/// Trait for publishing real-time events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a session after a committed change.
    async fn publish_session(&self, session: &SessionAggregate) -> AppResult<()>;

    /// Publish a sprint after a committed change.
    async fn publish_sprint(&self, sprint: &Sprint) -> AppResult<()>;

    /// Announce that a session has ended.
    async fn publish_session_closed(&self, session_id: &str) -> AppResult<()>;
}

/// A no-op implementation of `EventPublisher` for tests or when real-time
/// events are disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_session(&self, _session: &SessionAggregate) -> AppResult<()> {
        Ok(())
    }

    async fn publish_sprint(&self, _sprint: &Sprint) -> AppResult<()> {
        Ok(())
    }

    async fn publish_session_closed(&self, _session_id: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed `EventPublisher` trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_closed_shape() {
        let event = StreamEvent::SessionClosed {
            session_id: "s1".to_string(),
        };

        assert_eq!(event.topic(), (Topic::Session, "s1"));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"type": "sessionClosed", "body": {"sessionId": "s1"}})
        );
    }
}
