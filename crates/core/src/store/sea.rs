//! sea-orm backed stores.
//!
//! The only place storage rows and domain documents meet: JSONB columns
//! are decoded here and `DateTimeWithTimeZone` becomes `DateTime<Utc>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::Set;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sprintdeck_common::{AppError, AppResult, SharedClock};
use sprintdeck_db::entities::{backlog_story, epic, planning_session, sprint};
use sprintdeck_db::repositories::{
    BacklogStoryRepository, EpicRepository, GuardedStoryWrite, PlanningSessionRepository,
    SprintRepository,
};

use super::{BacklogStore, EpicStore, SessionStore, SprintStore};
use crate::deck::Deck;
use crate::model::{
    BacklogFilter, BacklogStatus, BacklogStory, BacklogStoryPatch, Epic, SessionAggregate, Sprint,
    StoryUpdate, epic_status_from_counts,
};

fn decode<T: DeserializeOwned>(what: &str, value: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(value).map_err(|e| AppError::Internal(format!("Corrupt {what}: {e}")))
}

fn encode<T: Serialize>(what: &str, value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to encode {what}: {e}")))
}

fn utc(value: sea_orm::prelude::DateTimeWithTimeZone) -> DateTime<Utc> {
    value.with_timezone(&Utc)
}

// === Sessions ===

fn session_from_model(model: planning_session::Model) -> AppResult<SessionAggregate> {
    let custom = model
        .custom_deck
        .map(|cards| decode::<Vec<String>>("custom deck", cards))
        .transpose()?;

    Ok(SessionAggregate {
        participants: decode("participants", model.participants)?,
        stories: decode("session stories", model.stories)?,
        deck: Deck::from_parts(model.deck_type, custom)?,
        id: model.id,
        name: model.name,
        host_id: model.host_id,
        current_story_id: model.current_story_id,
        voting_in_progress: model.voting_in_progress,
        votes_revealed: model.votes_revealed,
        is_active: model.is_active,
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
        version: model.version,
    })
}

fn session_to_active(doc: &SessionAggregate) -> AppResult<planning_session::ActiveModel> {
    let custom_deck = doc
        .deck
        .custom_cards()
        .map(|cards| encode("custom deck", &cards))
        .transpose()?;

    Ok(planning_session::ActiveModel {
        id: Set(doc.id.clone()),
        name: Set(doc.name.clone()),
        host_id: Set(doc.host_id.clone()),
        participants: Set(encode("participants", &doc.participants)?),
        stories: Set(encode("session stories", &doc.stories)?),
        current_story_id: Set(doc.current_story_id.clone()),
        voting_in_progress: Set(doc.voting_in_progress),
        votes_revealed: Set(doc.votes_revealed),
        deck_type: Set(doc.deck.deck_type()),
        custom_deck: Set(custom_deck),
        is_active: Set(doc.is_active),
        version: Set(doc.version),
        created_at: Set(doc.created_at.into()),
        updated_at: Set(doc.updated_at.into()),
    })
}

/// Session store over the `planning_session` table.
#[derive(Clone)]
pub struct SeaSessionStore {
    repo: PlanningSessionRepository,
}

impl SeaSessionStore {
    /// Create a new store.
    #[must_use]
    pub const fn new(repo: PlanningSessionRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl SessionStore for SeaSessionStore {
    async fn load(&self, id: &str) -> AppResult<Option<SessionAggregate>> {
        self.repo
            .find_by_id(id)
            .await?
            .map(session_from_model)
            .transpose()
    }

    async fn insert(&self, doc: &SessionAggregate) -> AppResult<()> {
        self.repo.create(session_to_active(doc)?).await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        doc: &SessionAggregate,
        expected_version: i64,
    ) -> AppResult<bool> {
        self.repo
            .update_if_version(&doc.id, expected_version, session_to_active(doc)?)
            .await
    }

    async fn list_active(&self) -> AppResult<Vec<SessionAggregate>> {
        self.repo
            .find_active()
            .await?
            .into_iter()
            .map(session_from_model)
            .collect()
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.repo.delete(id).await
    }
}

// === Sprints ===

fn sprint_from_model(model: sprint::Model) -> AppResult<Sprint> {
    Ok(Sprint {
        stories: decode("sprint stories", model.stories)?,
        metrics: model
            .metrics
            .map(|m| decode("sprint metrics", m))
            .transpose()?,
        id: model.id,
        project_id: model.project_id,
        name: model.name,
        goal: model.goal,
        host_id: model.host_id,
        status: model.status,
        start_date: utc(model.start_date),
        end_date: utc(model.end_date),
        retrospective: model.retrospective,
        password_hash: model.password_hash,
        allow_guest_access: model.allow_guest_access,
        completed_at: model.completed_at.map(utc),
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
        version: model.version,
    })
}

fn sprint_to_active(doc: &Sprint) -> AppResult<sprint::ActiveModel> {
    Ok(sprint::ActiveModel {
        id: Set(doc.id.clone()),
        project_id: Set(doc.project_id.clone()),
        name: Set(doc.name.clone()),
        goal: Set(doc.goal.clone()),
        host_id: Set(doc.host_id.clone()),
        status: Set(doc.status),
        start_date: Set(doc.start_date.into()),
        end_date: Set(doc.end_date.into()),
        stories: Set(encode("sprint stories", &doc.stories)?),
        retrospective: Set(doc.retrospective.clone()),
        metrics: Set(doc
            .metrics
            .as_ref()
            .map(|m| encode("sprint metrics", m))
            .transpose()?),
        password_hash: Set(doc.password_hash.clone()),
        allow_guest_access: Set(doc.allow_guest_access),
        version: Set(doc.version),
        completed_at: Set(doc.completed_at.map(Into::into)),
        created_at: Set(doc.created_at.into()),
        updated_at: Set(doc.updated_at.into()),
    })
}

fn patch_to_active(
    id: &str,
    patch: &BacklogStoryPatch,
    now: DateTime<Utc>,
) -> AppResult<backlog_story::ActiveModel> {
    let mut model = backlog_story::ActiveModel {
        id: Set(id.to_string()),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    if let Some(status) = patch.status {
        model.status = Set(status);
    }
    if let Some(estimate) = &patch.estimate {
        model.estimate = Set(estimate.clone());
    }
    if let Some(completed_at) = patch.completed_at {
        model.completed_at = Set(completed_at.map(Into::into));
    }
    if let Some(attempts) = &patch.sprint_attempts {
        model.sprint_attempts = Set(encode("sprint attempts", attempts)?);
    }
    Ok(model)
}

/// Sprint store over the `sprint` and `backlog_story` tables.
#[derive(Clone)]
pub struct SeaSprintStore {
    repo: SprintRepository,
}

impl SeaSprintStore {
    /// Create a new store.
    #[must_use]
    pub const fn new(repo: SprintRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl SprintStore for SeaSprintStore {
    async fn load(&self, id: &str) -> AppResult<Option<Sprint>> {
        self.repo
            .find_by_id(id)
            .await?
            .map(sprint_from_model)
            .transpose()
    }

    async fn insert(&self, doc: &Sprint) -> AppResult<()> {
        self.repo.create(sprint_to_active(doc)?).await?;
        Ok(())
    }

    async fn compare_and_swap(&self, doc: &Sprint, expected_version: i64) -> AppResult<bool> {
        self.repo
            .update_if_version(&doc.id, expected_version, sprint_to_active(doc)?)
            .await
    }

    async fn commit_with_stories(
        &self,
        doc: &Sprint,
        expected_version: i64,
        updates: &[StoryUpdate],
    ) -> AppResult<bool> {
        let stories = updates
            .iter()
            .map(|u| {
                Ok(GuardedStoryWrite {
                    id: u.story_id.clone(),
                    expected_status: u.expected_status,
                    expected_updated_at: u.expected_updated_at.into(),
                    model: patch_to_active(&u.story_id, &u.patch, doc.updated_at)?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        self.repo
            .commit_with_stories(&doc.id, expected_version, sprint_to_active(doc)?, stories)
            .await
    }

    async fn list_by_project(&self, project_id: &str) -> AppResult<Vec<Sprint>> {
        self.repo
            .find_by_project(project_id, None)
            .await?
            .into_iter()
            .map(sprint_from_model)
            .collect()
    }
}

// === Backlog ===

fn backlog_from_model(model: backlog_story::Model) -> AppResult<BacklogStory> {
    Ok(BacklogStory {
        sprint_attempts: decode("sprint attempts", model.sprint_attempts)?,
        id: model.id,
        project_id: model.project_id,
        epic_id: model.epic_id,
        title: model.title,
        description: model.description,
        status: model.status,
        estimate: model.estimate,
        completed_at: model.completed_at.map(utc),
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
    })
}

/// Backlog store over the `backlog_story` table.
#[derive(Clone)]
pub struct SeaBacklogStore {
    repo: BacklogStoryRepository,
    clock: SharedClock,
}

impl SeaBacklogStore {
    /// Create a new store.
    #[must_use]
    pub fn new(repo: BacklogStoryRepository, clock: SharedClock) -> Self {
        Self { repo, clock }
    }
}

#[async_trait]
impl BacklogStore for SeaBacklogStore {
    async fn get_stories_by_project(
        &self,
        project_id: &str,
        filter: &BacklogFilter,
    ) -> AppResult<Vec<BacklogStory>> {
        let rows = self.repo.find_by_project(project_id, filter.status).await?;
        let mut stories = Vec::with_capacity(rows.len());
        for row in rows {
            let story = backlog_from_model(row)?;
            if filter.matches(&story) {
                stories.push(story);
            }
        }
        Ok(stories)
    }

    async fn get_story(&self, id: &str) -> AppResult<Option<BacklogStory>> {
        self.repo
            .find_by_id(id)
            .await?
            .map(backlog_from_model)
            .transpose()
    }

    async fn update_story(&self, id: &str, patch: &BacklogStoryPatch) -> AppResult<()> {
        self.repo.get_by_id(id).await?;
        self.repo
            .update(patch_to_active(id, patch, self.clock.now())?)
            .await?;
        Ok(())
    }
}

// === Epics ===

fn epic_from_model(model: epic::Model) -> Epic {
    Epic {
        id: model.id,
        project_id: model.project_id,
        name: model.name,
        description: model.description,
        story_count: u32::try_from(model.story_count).unwrap_or(0),
        completed_story_count: u32::try_from(model.completed_story_count).unwrap_or(0),
        status: model.status,
    }
}

/// Epic store over the `epic` table, counting from `backlog_story`.
#[derive(Clone)]
pub struct SeaEpicStore {
    epics: EpicRepository,
    stories: BacklogStoryRepository,
}

impl SeaEpicStore {
    /// Create a new store.
    #[must_use]
    pub const fn new(epics: EpicRepository, stories: BacklogStoryRepository) -> Self {
        Self { epics, stories }
    }
}

#[async_trait]
impl EpicStore for SeaEpicStore {
    async fn get_epic(&self, id: &str) -> AppResult<Option<Epic>> {
        Ok(self.epics.find_by_id(id).await?.map(epic_from_model))
    }

    async fn update_epic_story_counts(&self, epic_id: &str) -> AppResult<()> {
        self.epics.get_by_id(epic_id).await?;

        let total = self.stories.count_by_epic(epic_id).await?;
        let completed = self
            .stories
            .count_by_epic_and_status(epic_id, BacklogStatus::Completed)
            .await?;
        let in_sprint = self
            .stories
            .count_by_epic_and_status(epic_id, BacklogStatus::InSprint)
            .await?;

        self.epics
            .update_counts(
                epic_id,
                i32::try_from(total).unwrap_or(i32::MAX),
                i32::try_from(completed).unwrap_or(i32::MAX),
                epic_status_from_counts(total, completed, in_sprint),
            )
            .await?;
        Ok(())
    }
}
