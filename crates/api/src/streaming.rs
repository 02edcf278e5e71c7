//! WebSocket streaming API.
//!
//! Clients subscribe to individual session or sprint documents and receive
//! the full document after every committed change.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sprintdeck_common::AppResult;
use sprintdeck_core::model::{SessionAggregate, Sprint};
use sprintdeck_core::{EventPublisher, StreamEvent, Topic};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::middleware::AppState;

/// Buffered events per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

/// A followed document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub kind: Topic,
    pub id: String,
}

/// Client-to-server message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Start following a document.
    Subscribe(Subscription),
    /// Stop following a document.
    Unsubscribe(Subscription),
}

/// Server-to-client control message. Documents are sent as [`StreamEvent`]s.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Subscription accepted.
    Subscribed(Subscription),
    /// Subscription rejected.
    Error { message: String },
}

/// Shared state for streaming.
///
/// Also the application's [`EventPublisher`]: every published document is
/// broadcast to all connections, which filter by subscription.
#[derive(Clone)]
pub struct StreamingState {
    tx: Arc<broadcast::Sender<StreamEvent>>,
}

impl StreamingState {
    /// Create a new streaming state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx: Arc::new(tx) }
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: StreamEvent) {
        // No receivers is not an error
        let _ = self.tx.send(event);
    }
}

impl Default for StreamingState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for StreamingState {
    async fn publish_session(&self, session: &SessionAggregate) -> AppResult<()> {
        self.send(StreamEvent::SessionUpdated(session.clone()));
        Ok(())
    }

    async fn publish_sprint(&self, sprint: &Sprint) -> AppResult<()> {
        self.send(StreamEvent::SprintUpdated(sprint.clone()));
        Ok(())
    }

    async fn publish_session_closed(&self, session_id: &str) -> AppResult<()> {
        self.send(StreamEvent::SessionClosed {
            session_id: session_id.to_string(),
        });
        Ok(())
    }
}

/// Whether `event` belongs to one of `subscriptions`.
#[must_use]
pub fn is_subscribed(subscriptions: &HashSet<Subscription>, event: &StreamEvent) -> bool {
    let (kind, id) = event.topic();
    subscriptions
        .iter()
        .any(|s| s.kind == kind && s.id == id)
}

/// Drops documents older than the newest one already delivered.
///
/// Writers publish after their commit without ordering, so a slow writer
/// can broadcast version `n` after a fast one broadcast `n + 1`.
#[derive(Debug, Default)]
pub struct LatestOnly {
    delivered: HashMap<(Topic, String), i64>,
}

impl LatestOnly {
    /// Whether `event` is newer than anything delivered for its document,
    /// recording it if so.
    pub fn admit(&mut self, event: &StreamEvent) -> bool {
        let Some(version) = event.version() else {
            return true;
        };
        let (kind, id) = event.topic();
        match self.delivered.get_mut(&(kind, id.to_string())) {
            Some(seen) if *seen >= version => false,
            Some(seen) => {
                *seen = version;
                true
            }
            None => {
                self.delivered.insert((kind, id.to_string()), version);
                true
            }
        }
    }
}

/// Current document for a subscription, sent right after subscribing.
pub async fn snapshot(state: &AppState, subscription: &Subscription) -> AppResult<StreamEvent> {
    Ok(match subscription.kind {
        Topic::Session => {
            StreamEvent::SessionUpdated(state.session_service.get(&subscription.id).await?)
        }
        Topic::Sprint => {
            StreamEvent::SprintUpdated(state.sprint_service.get(&subscription.id).await?)
        }
    })
}

/// WebSocket handler for streaming.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("New streaming connection");

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.streaming.subscribe();
    let mut subscriptions: HashSet<Subscription> = HashSet::new();
    let mut latest = LatestOnly::default();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            Some(msg) = receiver.next() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        let replies = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handle_client_message(
                                    &state,
                                    client_msg,
                                    &mut subscriptions,
                                    &mut latest,
                                )
                                .await
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to parse client message");
                                encode(&ServerMessage::Error {
                                    message: format!("invalid message: {e}"),
                                })
                                .into_iter()
                                .collect()
                            }
                        };
                        for reply in replies {
                            if sender.send(Message::Text(reply.into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Client closed connection");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            // Forward documents this connection follows
            received = events.recv() => {
                match received {
                    Ok(event) => {
                        if !is_subscribed(&subscriptions, &event) || !latest.admit(&event) {
                            continue;
                        }
                        let Some(json) = encode(&event) else {
                            continue;
                        };
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // The next event carries the full document again
                        warn!(skipped, "Streaming subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Streaming connection closed");
}

/// Handle a client message, returning the frames to send back.
async fn handle_client_message(
    state: &AppState,
    msg: ClientMessage,
    subscriptions: &mut HashSet<Subscription>,
    latest: &mut LatestOnly,
) -> Vec<String> {
    match msg {
        ClientMessage::Subscribe(subscription) => match snapshot(state, &subscription).await {
            Ok(current) => {
                debug!(kind = ?subscription.kind, id = %subscription.id, "Subscribed");
                subscriptions.insert(subscription.clone());
                latest.admit(&current);
                [
                    encode(&ServerMessage::Subscribed(subscription)),
                    encode(&current),
                ]
                .into_iter()
                .flatten()
                .collect()
            }
            Err(e) => encode(&ServerMessage::Error {
                message: e.to_string(),
            })
            .into_iter()
            .collect(),
        },
        ClientMessage::Unsubscribe(subscription) => {
            debug!(kind = ?subscription.kind, id = %subscription.id, "Unsubscribed");
            subscriptions.remove(&subscription);
            Vec::new()
        }
    }
}

fn encode<T: Serialize>(msg: &T) -> Option<String> {
    serde_json::to_string(msg)
        .inspect_err(|e| error!(error = %e, "Failed to encode streaming frame"))
        .ok()
}
