//! In-memory stores for tests.
//!
//! One [`MemoryStore`] implements every store trait over shared maps, so a
//! sprint commit and the backlog it touches see the same data.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use sprintdeck_common::{AppError, AppResult};
use tokio::sync::Mutex;

use super::{BacklogStore, EpicStore, SessionStore, SprintStore};
use crate::model::{
    BacklogFilter, BacklogStatus, BacklogStory, BacklogStoryPatch, Epic, SessionAggregate, Sprint,
    StoryUpdate, epic_status_from_counts,
};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionAggregate>,
    sprints: HashMap<String, Sprint>,
    // Keyed by ID; creation order is restored from `created_at`.
    stories: BTreeMap<String, BacklogStory>,
    epics: HashMap<String, Epic>,
}

/// Shared in-memory document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    forced_conflicts: Arc<AtomicU32>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` compare-and-swap writes report a lost race.
    pub fn inject_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Seed a backlog story.
    pub async fn put_story(&self, story: BacklogStory) {
        self.inner.lock().await.stories.insert(story.id.clone(), story);
    }

    /// Drop a backlog story.
    pub async fn remove_story(&self, id: &str) {
        self.inner.lock().await.stories.remove(id);
    }

    /// Seed an epic.
    pub async fn put_epic(&self, epic: Epic) {
        self.inner.lock().await.epics.insert(epic.id.clone(), epic);
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, id: &str) -> AppResult<Option<SessionAggregate>> {
        Ok(self.inner.lock().await.sessions.get(id).cloned())
    }

    async fn insert(&self, doc: &SessionAggregate) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.sessions.contains_key(&doc.id) {
            return Err(AppError::Conflict(format!("Session already exists: {}", doc.id)));
        }
        inner.sessions.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        doc: &SessionAggregate,
        expected_version: i64,
    ) -> AppResult<bool> {
        if self.take_forced_conflict() {
            return Ok(false);
        }
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(&doc.id) {
            Some(stored) if stored.version == expected_version => {
                *stored = doc.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active(&self) -> AppResult<Vec<SessionAggregate>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.inner.lock().await.sessions.remove(id);
        Ok(())
    }
}

#[async_trait]
impl SprintStore for MemoryStore {
    async fn load(&self, id: &str) -> AppResult<Option<Sprint>> {
        Ok(self.inner.lock().await.sprints.get(id).cloned())
    }

    async fn insert(&self, doc: &Sprint) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.sprints.contains_key(&doc.id) {
            return Err(AppError::Conflict(format!("Sprint already exists: {}", doc.id)));
        }
        inner.sprints.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn compare_and_swap(&self, doc: &Sprint, expected_version: i64) -> AppResult<bool> {
        self.commit_with_stories(doc, expected_version, &[]).await
    }

    async fn commit_with_stories(
        &self,
        doc: &Sprint,
        expected_version: i64,
        updates: &[StoryUpdate],
    ) -> AppResult<bool> {
        if self.take_forced_conflict() {
            return Ok(false);
        }
        let mut inner = self.inner.lock().await;
        if inner.sprints.get(&doc.id).map(|s| s.version) != Some(expected_version) {
            return Ok(false);
        }

        // Every story must still be as planned before anything is written
        let stale = updates.iter().any(|u| {
            inner
                .stories
                .get(&u.story_id)
                .is_none_or(|story| !u.still_applies_to(story))
        });
        if stale {
            return Ok(false);
        }

        for update in updates {
            if let Some(story) = inner.stories.get_mut(&update.story_id) {
                update.patch.apply(story, doc.updated_at);
            }
        }
        inner.sprints.insert(doc.id.clone(), doc.clone());
        Ok(true)
    }

    async fn list_by_project(&self, project_id: &str) -> AppResult<Vec<Sprint>> {
        let inner = self.inner.lock().await;
        let mut sprints: Vec<_> = inner
            .sprints
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        sprints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sprints)
    }
}

#[async_trait]
impl BacklogStore for MemoryStore {
    async fn get_stories_by_project(
        &self,
        project_id: &str,
        filter: &BacklogFilter,
    ) -> AppResult<Vec<BacklogStory>> {
        let inner = self.inner.lock().await;
        let mut stories: Vec<_> = inner
            .stories
            .values()
            .filter(|s| s.project_id == project_id && filter.matches(s))
            .cloned()
            .collect();
        stories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(stories)
    }

    async fn get_story(&self, id: &str) -> AppResult<Option<BacklogStory>> {
        Ok(self.inner.lock().await.stories.get(id).cloned())
    }

    async fn update_story(&self, id: &str, patch: &BacklogStoryPatch) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let story = inner
            .stories
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Backlog story not found: {id}")))?;
        patch.apply(story, chrono::Utc::now());
        Ok(())
    }
}

#[async_trait]
impl EpicStore for MemoryStore {
    async fn get_epic(&self, id: &str) -> AppResult<Option<Epic>> {
        Ok(self.inner.lock().await.epics.get(id).cloned())
    }

    async fn update_epic_story_counts(&self, epic_id: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let (mut total, mut completed, mut in_sprint) = (0_u64, 0_u64, 0_u64);
        for story in inner
            .stories
            .values()
            .filter(|s| s.epic_id.as_deref() == Some(epic_id))
        {
            total += 1;
            match story.status {
                BacklogStatus::Completed => completed += 1,
                BacklogStatus::InSprint => in_sprint += 1,
                BacklogStatus::Backlog => {}
            }
        }

        let epic = inner
            .epics
            .get_mut(epic_id)
            .ok_or_else(|| AppError::NotFound(format!("Epic not found: {epic_id}")))?;
        epic.story_count = u32::try_from(total).unwrap_or(u32::MAX);
        epic.completed_story_count = u32::try_from(completed).unwrap_or(u32::MAX);
        epic.status = epic_status_from_counts(total, completed, in_sprint);
        Ok(())
    }
}
