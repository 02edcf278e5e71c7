//! Planning session service.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sprintdeck_common::{AppError, AppResult, IdGenerator, SharedClock};
use tracing::{info, warn};
use validator::Validate;

use crate::access::Actor;
use crate::consensus::SessionMetrics;
use crate::deck::Deck;
use crate::model::{BacklogFilter, Mutation, SessionAggregate};
use crate::retry::CasPolicy;
use crate::services::event_publisher::EventPublisherService;
use crate::store::{SharedBacklogStore, SharedSessionStore};

/// Planning session service.
///
/// Every mutation is a load, apply, compare-and-swap cycle on the session
/// document, retried on a lost race. Successful writes are broadcast.
#[derive(Clone)]
pub struct SessionService {
    store: SharedSessionStore,
    backlog: SharedBacklogStore,
    publisher: EventPublisherService,
    clock: SharedClock,
    policy: CasPolicy,
    stale_after: Duration,
    id_gen: IdGenerator,
}

/// Input for creating a session.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionInput {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[serde(default)]
    pub deck: Deck,
}

/// Input for adding a story to a session.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddSessionStoryInput {
    #[validate(length(min = 1, max = 512))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 8192))]
    pub description: String,
}

impl SessionService {
    /// Create a new session service.
    #[must_use]
    pub fn new(
        store: SharedSessionStore,
        backlog: SharedBacklogStore,
        publisher: EventPublisherService,
        clock: SharedClock,
        policy: CasPolicy,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            backlog,
            publisher,
            clock,
            policy,
            stale_after,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a session hosted by `host`.
    pub async fn create(&self, host: &Actor, input: CreateSessionInput) -> AppResult<SessionAggregate> {
        input.validate()?;

        let session = SessionAggregate::create(
            self.id_gen.generate(),
            &input.name,
            host,
            input.deck,
            self.clock.now(),
        )?;
        self.store.insert(&session).await?;

        info!(session_id = %session.id, host_id = %host.id, "Session created");
        self.publish(&session).await;
        Ok(session)
    }

    /// Load a session.
    pub async fn get(&self, id: &str) -> AppResult<SessionAggregate> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {id}")))
    }

    /// Join, or rejoin, a session.
    pub async fn join(&self, id: &str, actor: &Actor) -> AppResult<SessionAggregate> {
        self.mutate(id, |doc, now| doc.join(actor, now)).await
    }

    /// Leave a session.
    pub async fn leave(&self, id: &str, actor: &Actor) -> AppResult<SessionAggregate> {
        self.mutate(id, |doc, _| doc.leave(&actor.id)).await
    }

    /// Refresh the caller's liveness.
    pub async fn heartbeat(&self, id: &str, actor: &Actor) -> AppResult<SessionAggregate> {
        self.mutate(id, |doc, now| doc.heartbeat(&actor.id, now)).await
    }

    /// Add a story to estimate.
    pub async fn add_story(
        &self,
        id: &str,
        actor: &Actor,
        input: AddSessionStoryInput,
    ) -> AppResult<SessionAggregate> {
        input.validate()?;
        let story_id = self.id_gen.generate();

        self.mutate(id, |doc, _| {
            let caps = actor.capabilities(&doc.host_id);
            doc.add_story(&caps, story_id.clone(), &input.title, &input.description)
                .map(|_| Mutation::Applied)
        })
        .await
    }

    /// Import a project's available backlog stories.
    ///
    /// Returns the session and the number of stories added.
    pub async fn import_stories(
        &self,
        id: &str,
        actor: &Actor,
        project_id: &str,
    ) -> AppResult<(SessionAggregate, usize)> {
        let backlog = self
            .backlog
            .get_stories_by_project(project_id, &BacklogFilter::available())
            .await?;

        let mut imported = 0;
        let session = self
            .mutate(id, |doc, _| {
                let caps = actor.capabilities(&doc.host_id);
                imported = doc.import_stories(&caps, &backlog, &self.id_gen)?;
                Ok(if imported > 0 {
                    Mutation::Applied
                } else {
                    Mutation::Unchanged
                })
            })
            .await?;
        Ok((session, imported))
    }

    /// Remove a story.
    pub async fn remove_story(
        &self,
        id: &str,
        actor: &Actor,
        story_id: &str,
    ) -> AppResult<SessionAggregate> {
        self.mutate(id, |doc, _| {
            let caps = actor.capabilities(&doc.host_id);
            doc.remove_story(&caps, story_id)
        })
        .await
    }

    /// Switch the session's deck.
    pub async fn change_deck(&self, id: &str, actor: &Actor, deck: Deck) -> AppResult<SessionAggregate> {
        self.mutate(id, |doc, _| doc.change_deck(&actor.id, deck.clone()))
            .await
    }

    /// Open a round on a story.
    pub async fn start_voting(
        &self,
        id: &str,
        actor: &Actor,
        story_id: &str,
    ) -> AppResult<SessionAggregate> {
        self.mutate(id, |doc, _| {
            let caps = actor.capabilities(&doc.host_id);
            doc.start_voting(&caps, story_id)
        })
        .await
    }

    /// Cast the caller's vote.
    pub async fn cast_vote(&self, id: &str, actor: &Actor, value: &str) -> AppResult<SessionAggregate> {
        self.mutate(id, |doc, _| doc.cast_vote(&actor.id, value)).await
    }

    /// Reveal the open round's votes.
    pub async fn reveal_votes(&self, id: &str, actor: &Actor) -> AppResult<SessionAggregate> {
        self.mutate(id, |doc, _| {
            let caps = actor.capabilities(&doc.host_id);
            doc.reveal_votes(&caps)
        })
        .await
    }

    /// Close the open round, recording it with an optional final estimate.
    pub async fn end_voting(
        &self,
        id: &str,
        actor: &Actor,
        final_estimate: Option<&str>,
    ) -> AppResult<SessionAggregate> {
        self.mutate(id, |doc, now| {
            let caps = actor.capabilities(&doc.host_id);
            doc.end_voting(&caps, final_estimate, self.id_gen.generate(), now)
        })
        .await
    }

    /// End the session.
    pub async fn end_session(&self, id: &str, actor: &Actor) -> AppResult<SessionAggregate> {
        let session = self.mutate(id, |doc, _| doc.end(&actor.id)).await?;

        if let Err(e) = self.publisher.publish_session_closed(&session.id).await {
            warn!(error = %e, session_id = %session.id, "Failed to publish session close");
        }
        Ok(session)
    }

    /// Session statistics as of now.
    pub async fn metrics(&self, id: &str) -> AppResult<SessionMetrics> {
        let session = self.get(id).await?;
        Ok(session.metrics(self.clock.now()))
    }

    /// Mark stale participants offline across all active sessions.
    ///
    /// A failure on one session is logged and the sweep moves on. Returns
    /// how many participants went offline.
    pub async fn sweep_stale_participants(&self) -> AppResult<usize> {
        let sessions = self.store.list_active().await?;
        let now = self.clock.now();
        let mut total = 0;

        for session in sessions {
            let has_stale = session
                .participants
                .iter()
                .any(|p| p.is_online && now - p.last_seen > self.stale_after);
            if !has_stale {
                continue;
            }

            let mut swept = 0;
            let result = self
                .mutate(&session.id, |doc, now| {
                    swept = doc.sweep_stale(now, self.stale_after);
                    Ok(if swept > 0 {
                        Mutation::Applied
                    } else {
                        Mutation::Unchanged
                    })
                })
                .await;

            match result {
                Ok(_) => total += swept,
                Err(e) => {
                    warn!(error = %e, session_id = %session.id, "Failed to sweep stale participants");
                }
            }
        }

        Ok(total)
    }

    async fn mutate<F>(&self, id: &str, mut op: F) -> AppResult<SessionAggregate>
    where
        F: FnMut(&mut SessionAggregate, DateTime<Utc>) -> AppResult<Mutation> + Send,
    {
        let mut lost = 0;
        loop {
            let mut doc = self.get(id).await?;
            let expected = doc.version;
            let now = self.clock.now();

            if !op(&mut doc, now)?.is_applied() {
                return Ok(doc);
            }
            doc.touch(now);

            if self.store.compare_and_swap(&doc, expected).await? {
                self.publish(&doc).await;
                return Ok(doc);
            }
            lost += 1;
            self.policy.wait_after_lost_race(lost, id).await?;
        }
    }

    async fn publish(&self, session: &SessionAggregate) {
        if let Err(e) = self.publisher.publish_session(session).await {
            warn!(error = %e, session_id = %session.id, "Failed to publish session update");
        }
    }
}
