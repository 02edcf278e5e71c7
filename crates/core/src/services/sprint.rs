//! Sprint service.

use std::slice;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sprintdeck_common::{AppError, AppResult, IdGenerator, SharedClock};
use tracing::{info, warn};
use validator::Validate;

use crate::access::{Actor, Capabilities, Capability};
use crate::board::SprintDraft;
use crate::model::{
    BacklogStatus, BacklogStoryPatch, Mutation, Sprint, SprintMetrics, SprintStatus, Stage,
    StoryUpdate,
};
use crate::reconciliation::{
    CancellationPlan, CompletionPlan, calculate_sprint_metrics, ensure_cancellable,
    ensure_completable, plan_cancellation, plan_completion,
};
use crate::retry::CasPolicy;
use crate::services::epic::EpicService;
use crate::services::event_publisher::EventPublisherService;
use crate::store::{SharedBacklogStore, SharedSprintStore};

/// Sprint service.
///
/// Board operations are compare-and-swap writes of the sprint document.
/// Adding a story, cancelling and completing also write backlog stories,
/// in the same atomic commit as the sprint.
#[derive(Clone)]
pub struct SprintService {
    sprints: SharedSprintStore,
    backlog: SharedBacklogStore,
    epics: EpicService,
    publisher: EventPublisherService,
    clock: SharedClock,
    policy: CasPolicy,
    id_gen: IdGenerator,
}

/// Input for creating a sprint.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSprintInput {
    #[validate(length(min = 1, max = 64))]
    pub project_id: String,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(length(max = 2048))]
    pub goal: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(length(min = 4, max = 128))]
    pub password: Option<String>,
    #[serde(default)]
    pub allow_guest_access: bool,
}

/// Input for reporting a blocker.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportBlockerInput {
    pub story_id: String,
    #[validate(length(min = 1, max = 1000))]
    pub description: String,
}

impl SprintService {
    /// Create a new sprint service.
    #[must_use]
    pub fn new(
        sprints: SharedSprintStore,
        backlog: SharedBacklogStore,
        epics: EpicService,
        publisher: EventPublisherService,
        clock: SharedClock,
        policy: CasPolicy,
    ) -> Self {
        Self {
            sprints,
            backlog,
            epics,
            publisher,
            clock,
            policy,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a draft sprint hosted by `actor`.
    ///
    /// Only roles that may start a sprint may create one.
    pub async fn create(&self, actor: &Actor, input: CreateSprintInput) -> AppResult<Sprint> {
        Capabilities::for_role(actor.role).require(Capability::StartSprint)?;
        input.validate()?;

        let password_hash = input
            .password
            .as_deref()
            .map(hash_password)
            .transpose()?;
        let draft = SprintDraft {
            project_id: input.project_id,
            name: input.name,
            goal: input.goal,
            start_date: input.start_date,
            end_date: input.end_date,
            allow_guest_access: input.allow_guest_access,
        };

        let sprint = Sprint::create(
            self.id_gen.generate(),
            &actor.id,
            draft,
            password_hash,
            self.clock.now(),
        )?;
        self.sprints.insert(&sprint).await?;

        info!(sprint_id = %sprint.id, project_id = %sprint.project_id, "Sprint created");
        self.publish(&sprint).await;
        Ok(sprint)
    }

    /// Load a sprint.
    pub async fn get(&self, id: &str) -> AppResult<Sprint> {
        self.sprints
            .load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sprint not found: {id}")))
    }

    /// Sprints of a project, newest first.
    pub async fn list_by_project(&self, project_id: &str) -> AppResult<Vec<Sprint>> {
        self.sprints.list_by_project(project_id).await
    }

    /// Check the guest password gate.
    ///
    /// Passes when guest access is allowed, or when `password` verifies
    /// against the stored hash. A sprint with neither is closed to guests.
    pub async fn verify_access(&self, id: &str, password: Option<&str>) -> AppResult<bool> {
        let sprint = self.get(id).await?;
        if sprint.allow_guest_access {
            return Ok(true);
        }
        match (sprint.password_hash.as_deref(), password) {
            (Some(hash), Some(password)) => verify_password(password, hash),
            _ => Ok(false),
        }
    }

    /// Pull a backlog story onto the board and mark it `in_sprint`.
    pub async fn add_story(&self, id: &str, actor: &Actor, backlog_story_id: &str) -> AppResult<Sprint> {
        let story_id = self.id_gen.generate();
        let mut lost = 0;

        loop {
            let mut sprint = self.get(id).await?;
            let expected = sprint.version;
            let source = self.backlog.get_story(backlog_story_id).await?.ok_or_else(|| {
                AppError::NotFound(format!("Backlog story not found: {backlog_story_id}"))
            })?;

            let caps = actor.capabilities(&sprint.host_id);
            sprint.add_story(&caps, story_id.clone(), &source)?;
            sprint.touch(self.clock.now());

            // Claims the story only while it is still available
            let update = StoryUpdate::for_story(
                &source,
                BacklogStoryPatch {
                    status: Some(BacklogStatus::InSprint),
                    ..BacklogStoryPatch::default()
                },
            )
            .while_status(BacklogStatus::Backlog);
            if self
                .sprints
                .commit_with_stories(&sprint, expected, slice::from_ref(&update))
                .await?
            {
                info!(sprint_id = %sprint.id, story_id = %source.id, "Story added to sprint");
                self.publish(&sprint).await;
                if let Some(epic_id) = &source.epic_id {
                    self.epics.refresh(slice::from_ref(epic_id)).await;
                }
                return Ok(sprint);
            }
            lost += 1;
            self.policy.wait_after_lost_race(lost, id).await?;
        }
    }

    /// `draft` to `active`.
    pub async fn start(&self, id: &str, actor: &Actor) -> AppResult<Sprint> {
        self.mutate(id, |sprint, _| {
            let caps = actor.capabilities(&sprint.host_id);
            sprint.start(&caps)
        })
        .await
    }

    /// Move a story to another stage.
    pub async fn move_story(
        &self,
        id: &str,
        actor: &Actor,
        story_id: &str,
        to: Stage,
    ) -> AppResult<Sprint> {
        self.mutate(id, |sprint, now| {
            let caps = actor.capabilities(&sprint.host_id);
            sprint.move_story(&caps, story_id, to, &actor.id, now)
        })
        .await
    }

    /// Assign a story, or clear its assignee.
    pub async fn assign_story(
        &self,
        id: &str,
        actor: &Actor,
        story_id: &str,
        assignee: Option<String>,
    ) -> AppResult<Sprint> {
        self.mutate(id, |sprint, _| {
            let caps = actor.capabilities(&sprint.host_id);
            sprint.assign_story(&caps, story_id, assignee.clone())
        })
        .await
    }

    /// Set a story's progress percentage.
    pub async fn update_progress(
        &self,
        id: &str,
        actor: &Actor,
        story_id: &str,
        progress: u8,
    ) -> AppResult<Sprint> {
        self.mutate(id, |sprint, _| {
            let caps = actor.capabilities(&sprint.host_id);
            sprint.update_progress(&caps, story_id, progress)
        })
        .await
    }

    /// Report a blocker on a story.
    pub async fn report_blocker(
        &self,
        id: &str,
        actor: &Actor,
        input: ReportBlockerInput,
    ) -> AppResult<Sprint> {
        input.validate()?;
        let blocker_id = self.id_gen.generate();

        self.mutate(id, |sprint, now| {
            let caps = actor.capabilities(&sprint.host_id);
            sprint.report_blocker(
                &caps,
                &input.story_id,
                blocker_id.clone(),
                &input.description,
                &actor.id,
                now,
            )
        })
        .await
    }

    /// Resolve a blocker.
    pub async fn resolve_blocker(
        &self,
        id: &str,
        actor: &Actor,
        story_id: &str,
        blocker_id: &str,
    ) -> AppResult<Sprint> {
        self.mutate(id, |sprint, now| {
            let caps = actor.capabilities(&sprint.host_id);
            sprint.resolve_blocker(&caps, story_id, blocker_id, now)
        })
        .await
    }

    /// Record retrospective notes.
    pub async fn set_retrospective(&self, id: &str, actor: &Actor, notes: &str) -> AppResult<Sprint> {
        self.mutate(id, |sprint, _| {
            let caps = actor.capabilities(&sprint.host_id);
            sprint.set_retrospective(&caps, notes)
        })
        .await
    }

    /// Cancel a draft or active sprint, returning its stories to the backlog.
    pub async fn cancel(&self, id: &str, actor: &Actor) -> AppResult<(Sprint, CancellationPlan)> {
        let mut lost = 0;
        loop {
            let mut sprint = self.get(id).await?;
            let expected = sprint.version;
            actor
                .capabilities(&sprint.host_id)
                .require(Capability::EndSprint)?;
            ensure_cancellable(&sprint)?;

            let backlog = self.backlog.get_stories(&referenced_ids(&sprint)).await?;
            let plan = plan_cancellation(&sprint, &backlog)?;
            sprint.mark_cancelled();
            sprint.touch(self.clock.now());

            if self
                .sprints
                .commit_with_stories(&sprint, expected, &plan.story_updates)
                .await?
            {
                info!(
                    sprint_id = %sprint.id,
                    reverted = plan.reverted_to_backlog_ids.len(),
                    skipped = plan.skipped_story_ids.len(),
                    "Sprint cancelled"
                );
                self.publish(&sprint).await;
                self.epics.refresh(&plan.touched_epic_ids).await;
                return Ok((sprint, plan));
            }
            lost += 1;
            self.policy.wait_after_lost_race(lost, id).await?;
        }
    }

    /// Complete an active sprint and reconcile its stories with the backlog.
    ///
    /// The sprint and every backlog story are written in one commit guarded
    /// by the sprint version, so completing twice fails with `Conflict` and
    /// never records a second attempt.
    pub async fn complete(&self, id: &str, actor: &Actor) -> AppResult<(Sprint, CompletionPlan)> {
        let mut lost = 0;
        loop {
            let mut sprint = self.get(id).await?;
            let expected = sprint.version;
            actor
                .capabilities(&sprint.host_id)
                .require(Capability::EndSprint)?;
            ensure_completable(&sprint)?;

            let now = self.clock.now();
            let backlog = self.backlog.get_stories(&referenced_ids(&sprint)).await?;
            let plan = plan_completion(&sprint, &backlog, now)?;
            sprint.mark_completed(&plan, now);
            sprint.touch(now);

            if self
                .sprints
                .commit_with_stories(&sprint, expected, &plan.story_updates)
                .await?
            {
                info!(
                    sprint_id = %sprint.id,
                    completed = plan.completed_story_ids.len(),
                    reverted = plan.reverted_to_backlog_ids.len(),
                    skipped = plan.skipped_story_ids.len(),
                    "Sprint completed"
                );
                self.publish(&sprint).await;
                self.epics.refresh(&plan.touched_epic_ids).await;
                return Ok((sprint, plan));
            }
            lost += 1;
            self.policy.wait_after_lost_race(lost, id).await?;
        }
    }

    /// Sprint metrics. Completed sprints report what was recorded at
    /// completion; others are computed from the current board.
    pub async fn metrics(&self, id: &str) -> AppResult<SprintMetrics> {
        let sprint = self.get(id).await?;
        Ok(match (&sprint.metrics, sprint.status) {
            (Some(recorded), SprintStatus::Completed) => recorded.clone(),
            _ => calculate_sprint_metrics(&sprint),
        })
    }

    async fn mutate<F>(&self, id: &str, mut op: F) -> AppResult<Sprint>
    where
        F: FnMut(&mut Sprint, DateTime<Utc>) -> AppResult<Mutation> + Send,
    {
        let mut lost = 0;
        loop {
            let mut sprint = self.get(id).await?;
            let expected = sprint.version;
            let now = self.clock.now();

            if !op(&mut sprint, now)?.is_applied() {
                return Ok(sprint);
            }
            sprint.touch(now);

            if self.sprints.compare_and_swap(&sprint, expected).await? {
                self.publish(&sprint).await;
                return Ok(sprint);
            }
            lost += 1;
            self.policy.wait_after_lost_race(lost, id).await?;
        }
    }

    async fn publish(&self, sprint: &Sprint) {
        if let Err(e) = self.publisher.publish_sprint(sprint).await {
            warn!(error = %e, sprint_id = %sprint.id, "Failed to publish sprint update");
        }
    }
}

fn referenced_ids(sprint: &Sprint) -> Vec<String> {
    sprint
        .stories
        .iter()
        .map(|s| s.original_story_id.clone())
        .collect()
}

/// Hash a sprint password.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::model::{BacklogStory, CompletionStatus, Epic, EpicStatus};
    use crate::services::event_publisher::NoOpEventPublisher;
    use crate::store::BacklogStore;
    use crate::store::memory::MemoryStore;
    use crate::model::BacklogFilter;
    use crate::store::SharedBacklogStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use sprintdeck_common::FixedClock;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Barrier, Mutex};

    struct Harness {
        service: SprintService,
        store: MemoryStore,
        clock: FixedClock,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
    }

    fn service_over(
        store: &MemoryStore,
        backlog: SharedBacklogStore,
        clock: &FixedClock,
    ) -> SprintService {
        let policy = CasPolicy {
            max_attempts: 5,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
            multiplier: 2.0,
        };
        SprintService::new(
            Arc::new(store.clone()),
            backlog,
            EpicService::new(Arc::new(store.clone())),
            Arc::new(NoOpEventPublisher),
            Arc::new(clock.clone()),
            policy,
        )
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let clock = FixedClock::new(start());
        let service = service_over(&store, Arc::new(store.clone()), &clock);
        Harness {
            service,
            store,
            clock,
        }
    }

    /// Backlog whose first two single-story reads wait for each other, so
    /// two writers plan against the same snapshot.
    struct LockstepBacklog {
        inner: MemoryStore,
        barrier: Barrier,
        gated: AtomicUsize,
    }

    #[async_trait]
    impl BacklogStore for LockstepBacklog {
        async fn get_stories_by_project(
            &self,
            project_id: &str,
            filter: &BacklogFilter,
        ) -> AppResult<Vec<BacklogStory>> {
            self.inner.get_stories_by_project(project_id, filter).await
        }

        async fn get_story(&self, id: &str) -> AppResult<Option<BacklogStory>> {
            let story = self.inner.get_story(id).await?;
            if self.gated.fetch_add(1, Ordering::SeqCst) < 2 {
                self.barrier.wait().await;
            }
            Ok(story)
        }

        async fn update_story(&self, id: &str, patch: &BacklogStoryPatch) -> AppResult<()> {
            self.inner.update_story(id, patch).await
        }
    }

    /// Backlog that answers the first batch read from an earlier snapshot.
    struct StaleOnceBacklog {
        inner: MemoryStore,
        snapshot: Mutex<Option<HashMap<String, BacklogStory>>>,
    }

    #[async_trait]
    impl BacklogStore for StaleOnceBacklog {
        async fn get_stories_by_project(
            &self,
            project_id: &str,
            filter: &BacklogFilter,
        ) -> AppResult<Vec<BacklogStory>> {
            self.inner.get_stories_by_project(project_id, filter).await
        }

        async fn get_story(&self, id: &str) -> AppResult<Option<BacklogStory>> {
            self.inner.get_story(id).await
        }

        async fn update_story(&self, id: &str, patch: &BacklogStoryPatch) -> AppResult<()> {
            self.inner.update_story(id, patch).await
        }

        async fn get_stories(&self, ids: &[String]) -> AppResult<HashMap<String, BacklogStory>> {
            if let Some(snapshot) = self.snapshot.lock().await.take() {
                return Ok(snapshot);
            }
            self.inner.get_stories(ids).await
        }
    }

    fn host() -> Actor {
        Actor::new("sm", "Sam", Role::ScrumMaster)
    }

    fn input(password: Option<&str>, guests: bool) -> CreateSprintInput {
        CreateSprintInput {
            project_id: "p1".into(),
            name: "Sprint 7".into(),
            goal: Some("Ship checkout".into()),
            start_date: start(),
            end_date: start() + Duration::days(14),
            password: password.map(str::to_string),
            allow_guest_access: guests,
        }
    }

    async fn seed_backlog(store: &MemoryStore) {
        store
            .put_epic(Epic {
                id: "e1".into(),
                project_id: "p1".into(),
                name: "Checkout".into(),
                description: None,
                story_count: 0,
                completed_story_count: 0,
                status: EpicStatus::Planning,
            })
            .await;
        for (id, estimate) in [("b1", "5"), ("b2", "3")] {
            store
                .put_story(BacklogStory {
                    id: id.into(),
                    project_id: "p1".into(),
                    epic_id: Some("e1".into()),
                    title: format!("Story {id}"),
                    description: None,
                    status: BacklogStatus::Backlog,
                    estimate: Some(estimate.into()),
                    sprint_attempts: Vec::new(),
                    completed_at: None,
                    created_at: start(),
                    updated_at: start(),
                })
                .await;
        }
    }

    async fn active_sprint(h: &Harness) -> Sprint {
        seed_backlog(&h.store).await;
        let sprint = h.service.create(&host(), input(None, true)).await.unwrap();
        h.service.add_story(&sprint.id, &host(), "b1").await.unwrap();
        h.service.add_story(&sprint.id, &host(), "b2").await.unwrap();
        h.service.start(&sprint.id, &host()).await.unwrap()
    }

    fn board_id(sprint: &Sprint, backlog_id: &str) -> String {
        sprint
            .stories
            .iter()
            .find(|s| s.original_story_id == backlog_id)
            .unwrap()
            .id
            .clone()
    }

    #[tokio::test]
    async fn test_add_story_marks_backlog_in_sprint() {
        let h = harness();
        let sprint = active_sprint(&h).await;

        assert_eq!(sprint.stories.len(), 2);
        let b1 = h.store.get_story("b1").await.unwrap().unwrap();
        assert_eq!(b1.status, BacklogStatus::InSprint);

        let epic = h.service.epics.get("e1").await.unwrap();
        assert_eq!(epic.status, EpicStatus::Active);
    }

    #[tokio::test]
    async fn test_adding_taken_story_conflicts() {
        let h = harness();
        let sprint = active_sprint(&h).await;
        let other = h.service.create(&host(), input(None, true)).await.unwrap();

        assert!(matches!(
            h.service.add_story(&other.id, &host(), "b1").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            h.service.add_story(&sprint.id, &host(), "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_adds_claim_story_once() {
        let h = harness();
        seed_backlog(&h.store).await;
        let backlog = Arc::new(LockstepBacklog {
            inner: h.store.clone(),
            barrier: Barrier::new(2),
            gated: AtomicUsize::new(0),
        });
        let service = service_over(&h.store, backlog, &h.clock);
        let a = service.create(&host(), input(None, true)).await.unwrap();
        let b = service.create(&host(), input(None, true)).await.unwrap();

        let actor = host();
        let (to_a, to_b) = tokio::join!(
            service.add_story(&a.id, &actor, "b1"),
            service.add_story(&b.id, &actor, "b1"),
        );

        let claimed: Vec<_> = [&to_a, &to_b].into_iter().filter(|r| r.is_ok()).collect();
        assert_eq!(claimed.len(), 1);
        assert!(
            [to_a, to_b]
                .into_iter()
                .any(|r| matches!(r, Err(AppError::Conflict(_))))
        );

        let a = service.get(&a.id).await.unwrap();
        let b = service.get(&b.id).await.unwrap();
        assert_eq!(a.stories.len() + b.stories.len(), 1);
        let b1 = h.store.get_story("b1").await.unwrap().unwrap();
        assert_eq!(b1.status, BacklogStatus::InSprint);
    }

    #[tokio::test]
    async fn test_story_vanishing_during_completion_is_skipped() {
        let h = harness();
        let sprint = active_sprint(&h).await;
        let b1 = board_id(&sprint, "b1");
        h.service
            .move_story(&sprint.id, &host(), &b1, Stage::Done)
            .await
            .unwrap();

        let snapshot = h
            .store
            .get_stories(&["b1".to_string(), "b2".to_string()])
            .await
            .unwrap();
        h.store.remove_story("b2").await;
        let backlog = Arc::new(StaleOnceBacklog {
            inner: h.store.clone(),
            snapshot: Mutex::new(Some(snapshot)),
        });
        let service = service_over(&h.store, backlog, &h.clock);

        let (done, plan) = service.complete(&sprint.id, &host()).await.unwrap();

        assert_eq!(done.status, SprintStatus::Completed);
        assert_eq!(plan.completed_story_ids, vec!["b1".to_string()]);
        assert_eq!(plan.skipped_story_ids, vec!["b2".to_string()]);
        let b1 = h.store.get_story("b1").await.unwrap().unwrap();
        assert_eq!(b1.status, BacklogStatus::Completed);
        assert_eq!(b1.sprint_attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_reconciles_backlog() {
        let h = harness();
        let sprint = active_sprint(&h).await;
        let b1 = board_id(&sprint, "b1");

        h.clock.advance(Duration::days(2));
        h.service
            .move_story(&sprint.id, &host(), &b1, Stage::InProgress)
            .await
            .unwrap();
        h.clock.advance(Duration::days(1));
        h.service
            .move_story(&sprint.id, &host(), &b1, Stage::Done)
            .await
            .unwrap();

        let (done, plan) = h.service.complete(&sprint.id, &host()).await.unwrap();

        assert_eq!(done.status, SprintStatus::Completed);
        assert_eq!(plan.completed_story_ids, vec!["b1".to_string()]);
        assert_eq!(plan.reverted_to_backlog_ids, vec!["b2".to_string()]);
        assert_eq!(plan.metrics.completed_points, 5.0);

        let b1 = h.store.get_story("b1").await.unwrap().unwrap();
        assert_eq!(b1.status, BacklogStatus::Completed);
        assert_eq!(b1.sprint_attempts.len(), 1);
        assert_eq!(b1.sprint_attempts[0].completion_status, CompletionStatus::Completed);

        let b2 = h.store.get_story("b2").await.unwrap().unwrap();
        assert_eq!(b2.status, BacklogStatus::Backlog);
        assert_eq!(b2.sprint_attempts[0].completion_status, CompletionStatus::Incomplete);

        let epic = h.service.epics.get("e1").await.unwrap();
        assert_eq!(epic.completed_story_count, 1);
        assert_eq!(epic.story_count, 2);
    }

    #[tokio::test]
    async fn test_second_completion_conflicts_without_new_attempts() {
        let h = harness();
        let sprint = active_sprint(&h).await;
        h.service.complete(&sprint.id, &host()).await.unwrap();

        let again = h.service.complete(&sprint.id, &host()).await;

        assert!(matches!(again, Err(AppError::Conflict(_))));
        let b1 = h.store.get_story("b1").await.unwrap().unwrap();
        assert_eq!(b1.sprint_attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_completion_survives_lost_race() {
        let h = harness();
        let sprint = active_sprint(&h).await;

        h.store.inject_conflicts(2);
        h.service.complete(&sprint.id, &host()).await.unwrap();

        let b2 = h.store.get_story("b2").await.unwrap().unwrap();
        assert_eq!(b2.sprint_attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_draft_sprint_cannot_complete() {
        let h = harness();
        let sprint = h.service.create(&host(), input(None, true)).await.unwrap();

        assert!(matches!(
            h.service.complete(&sprint.id, &host()).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_reverts_without_attempts() {
        let h = harness();
        let sprint = active_sprint(&h).await;

        let (cancelled, plan) = h.service.cancel(&sprint.id, &host()).await.unwrap();

        assert_eq!(cancelled.status, SprintStatus::Cancelled);
        assert_eq!(plan.reverted_to_backlog_ids.len(), 2);
        let b1 = h.store.get_story("b1").await.unwrap().unwrap();
        assert_eq!(b1.status, BacklogStatus::Backlog);
        assert!(b1.sprint_attempts.is_empty());
        assert!(matches!(
            h.service.cancel(&sprint.id, &host()).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_roles_gate_board_moves() {
        let h = harness();
        let sprint = active_sprint(&h).await;
        let b1 = board_id(&sprint, "b1");
        let dev = Actor::new("dev", "Dana", Role::Developer);
        let tester = Actor::new("qa", "Quinn", Role::Tester);

        h.service
            .move_story(&sprint.id, &dev, &b1, Stage::Review)
            .await
            .unwrap();
        assert!(matches!(
            h.service.move_story(&sprint.id, &dev, &b1, Stage::Done).await,
            Err(AppError::Permission(_))
        ));
        h.service
            .move_story(&sprint.id, &tester, &b1, Stage::Done)
            .await
            .unwrap();
        assert!(matches!(
            h.service.complete(&sprint.id, &dev).await,
            Err(AppError::Permission(_))
        ));
    }

    #[tokio::test]
    async fn test_only_sprint_starters_create() {
        let h = harness();
        let dev = Actor::new("dev", "Dana", Role::Developer);

        assert!(matches!(
            h.service.create(&dev, input(None, true)).await,
            Err(AppError::Permission(_))
        ));
    }

    #[tokio::test]
    async fn test_end_before_start_is_invalid() {
        let h = harness();
        let mut bad = input(None, true);
        bad.end_date = bad.start_date;

        assert!(matches!(
            h.service.create(&host(), bad).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_password_gate() {
        let h = harness();
        let locked = h
            .service
            .create(&host(), input(Some("hunter22"), false))
            .await
            .unwrap();
        let open = h.service.create(&host(), input(None, true)).await.unwrap();
        let closed = h.service.create(&host(), input(None, false)).await.unwrap();

        assert!(locked.password_hash.as_deref().unwrap().starts_with("$argon2"));
        assert!(h.service.verify_access(&locked.id, Some("hunter22")).await.unwrap());
        assert!(!h.service.verify_access(&locked.id, Some("hunter2")).await.unwrap());
        assert!(!h.service.verify_access(&locked.id, None).await.unwrap());
        assert!(h.service.verify_access(&open.id, None).await.unwrap());
        assert!(!h.service.verify_access(&closed.id, Some("anything")).await.unwrap());
    }

    #[tokio::test]
    async fn test_blockers_and_retrospective() {
        let h = harness();
        let sprint = active_sprint(&h).await;
        let b1 = board_id(&sprint, "b1");
        let dev = Actor::new("dev", "Dana", Role::Developer);

        let blocked = h
            .service
            .report_blocker(
                &sprint.id,
                &dev,
                ReportBlockerInput {
                    story_id: b1.clone(),
                    description: "Waiting on payment provider sandbox".into(),
                },
            )
            .await
            .unwrap();
        let blocker_id = blocked.story(&b1).unwrap().blockers[0].id.clone();

        let resolved = h
            .service
            .resolve_blocker(&sprint.id, &dev, &b1, &blocker_id)
            .await
            .unwrap();
        assert!(!resolved.story(&b1).unwrap().blockers[0].is_open());

        let again = h
            .service
            .resolve_blocker(&sprint.id, &dev, &b1, &blocker_id)
            .await
            .unwrap();
        assert_eq!(again.version, resolved.version);

        assert!(matches!(
            h.service.set_retrospective(&sprint.id, &dev, "Went well").await,
            Err(AppError::Permission(_))
        ));
        let retro = h
            .service
            .set_retrospective(&sprint.id, &host(), "Went well")
            .await
            .unwrap();
        assert_eq!(retro.retrospective.as_deref(), Some("Went well"));
    }

    #[tokio::test]
    async fn test_metrics_frozen_after_completion() {
        let h = harness();
        let sprint = active_sprint(&h).await;
        let (_, plan) = h.service.complete(&sprint.id, &host()).await.unwrap();

        let metrics = h.service.metrics(&sprint.id).await.unwrap();

        assert_eq!(metrics, plan.metrics);
        assert_eq!(metrics.planned_points, 8.0);
        assert_eq!(metrics.completed_stories, 0);
    }

    #[test]
    fn test_hash_password_is_salted() {
        let first = hash_password("correct horse").unwrap();
        let second = hash_password("correct horse").unwrap();

        assert_ne!(first, second);
        assert!(verify_password("correct horse", &first).unwrap());
        assert!(verify_password("correct horse", &second).unwrap());
        assert!(verify_password("test", "invalid_hash").is_err());
    }
}
