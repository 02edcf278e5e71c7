//! Document store contracts.
//!
//! Services talk to persistence only through these traits. Session and
//! sprint writes are compare-and-swap on the document `version`: a write
//! whose expected version is stale returns `Ok(false)` and the caller
//! reloads and re-applies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sprintdeck_common::AppResult;

use crate::model::{
    BacklogFilter, BacklogStory, BacklogStoryPatch, Epic, SessionAggregate, Sprint, StoryUpdate,
};

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod sea;

/// Planning session documents.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session.
    async fn load(&self, id: &str) -> AppResult<Option<SessionAggregate>>;

    /// Store a new session.
    async fn insert(&self, doc: &SessionAggregate) -> AppResult<()>;

    /// Replace the stored session if its version is still `expected_version`.
    async fn compare_and_swap(&self, doc: &SessionAggregate, expected_version: i64)
    -> AppResult<bool>;

    /// Sessions that have not been ended.
    async fn list_active(&self) -> AppResult<Vec<SessionAggregate>>;

    /// Remove a session.
    async fn delete(&self, id: &str) -> AppResult<()>;
}

/// Sprint documents.
#[async_trait]
pub trait SprintStore: Send + Sync {
    /// Load a sprint.
    async fn load(&self, id: &str) -> AppResult<Option<Sprint>>;

    /// Store a new sprint.
    async fn insert(&self, doc: &Sprint) -> AppResult<()>;

    /// Replace the stored sprint if its version is still `expected_version`.
    async fn compare_and_swap(&self, doc: &Sprint, expected_version: i64) -> AppResult<bool>;

    /// Replace the sprint and apply `updates` to backlog stories, all or
    /// nothing. Version-guarded like [`Self::compare_and_swap`].
    async fn commit_with_stories(
        &self,
        doc: &Sprint,
        expected_version: i64,
        updates: &[StoryUpdate],
    ) -> AppResult<bool>;

    /// Sprints of a project, newest first.
    async fn list_by_project(&self, project_id: &str) -> AppResult<Vec<Sprint>>;
}

/// Project backlog.
#[async_trait]
pub trait BacklogStore: Send + Sync {
    /// Stories of a project matching `filter`, in creation order.
    async fn get_stories_by_project(
        &self,
        project_id: &str,
        filter: &BacklogFilter,
    ) -> AppResult<Vec<BacklogStory>>;

    /// Load one story.
    async fn get_story(&self, id: &str) -> AppResult<Option<BacklogStory>>;

    /// Apply a partial update to one story.
    async fn update_story(&self, id: &str, patch: &BacklogStoryPatch) -> AppResult<()>;

    /// Load several stories by ID. Missing IDs are absent from the map.
    async fn get_stories(&self, ids: &[String]) -> AppResult<HashMap<String, BacklogStory>> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(story) = self.get_story(id).await? {
                found.insert(id.clone(), story);
            }
        }
        Ok(found)
    }
}

/// Epic progress.
#[async_trait]
pub trait EpicStore: Send + Sync {
    /// Load an epic.
    async fn get_epic(&self, id: &str) -> AppResult<Option<Epic>>;

    /// Recount an epic's stories and re-derive its status.
    async fn update_epic_story_counts(&self, epic_id: &str) -> AppResult<()>;
}

/// Shared session store.
pub type SharedSessionStore = Arc<dyn SessionStore>;
/// Shared sprint store.
pub type SharedSprintStore = Arc<dyn SprintStore>;
/// Shared backlog store.
pub type SharedBacklogStore = Arc<dyn BacklogStore>;
/// Shared epic store.
pub type SharedEpicStore = Arc<dyn EpicStore>;
