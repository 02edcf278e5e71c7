//! Sprint completion and cancellation planning.
//!
//! Planning is pure: it reads the sprint and the backlog stories it
//! references and produces every backlog write the commit must make. The
//! service then writes the sprint and all of those stories in one
//! transaction, so a partial reconciliation is never observable.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sprintdeck_common::{AppError, AppResult};
use tracing::warn;

use crate::board::status_name;
use crate::model::{
    BacklogStatus, BacklogStory, BacklogStoryPatch, CompletionStatus, Sprint, SprintAttempt,
    SprintMetrics, SprintStatus, SprintStory, StoryUpdate, percentage, round1,
};

/// Everything a sprint completion writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPlan {
    pub metrics: SprintMetrics,
    /// Backlog IDs of stories finished in this sprint.
    pub completed_story_ids: Vec<String>,
    /// Backlog IDs of unfinished stories returned to the backlog.
    pub reverted_to_backlog_ids: Vec<String>,
    /// Backlog IDs that no longer exist and were left alone.
    pub skipped_story_ids: Vec<String>,
    #[serde(skip)]
    pub story_updates: Vec<StoryUpdate>,
    /// Epics whose counts need recomputing after the commit.
    pub touched_epic_ids: Vec<String>,
}

/// Everything a sprint cancellation writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationPlan {
    pub reverted_to_backlog_ids: Vec<String>,
    pub skipped_story_ids: Vec<String>,
    #[serde(skip)]
    pub story_updates: Vec<StoryUpdate>,
    pub touched_epic_ids: Vec<String>,
}

/// Compute completion metrics from the sprint's stories.
#[must_use]
pub fn calculate_sprint_metrics(sprint: &Sprint) -> SprintMetrics {
    let done: Vec<&SprintStory> = sprint.stories.iter().filter(|s| s.is_done()).collect();

    let planned_points: f64 = sprint.stories.iter().filter_map(SprintStory::points).sum();
    let completed_points: f64 = done.iter().filter_map(|s| s.points()).sum();

    let cycle_times: Vec<f64> = done
        .iter()
        .filter_map(|s| match (s.started_at, s.completed_at) {
            (Some(start), Some(end)) if end >= start => {
                Some((end - start).num_seconds() as f64 / 3600.0)
            }
            _ => None,
        })
        .collect();
    let average_cycle_time_hours = if cycle_times.is_empty() {
        0.0
    } else {
        round1(cycle_times.iter().sum::<f64>() / cycle_times.len() as f64)
    };

    let sprint_days = (sprint.end_date - sprint.start_date).num_days().max(1);

    SprintMetrics {
        planned_points,
        completed_points,
        planned_stories: sprint.stories.len(),
        completed_stories: done.len(),
        completion_rate: percentage(done.len(), sprint.stories.len()),
        average_cycle_time_hours,
        throughput: round1(done.len() as f64 / sprint_days as f64),
    }
}

fn attempt_for(sprint: &Sprint, story: &SprintStory, now: DateTime<Utc>) -> SprintAttempt {
    SprintAttempt {
        sprint_id: sprint.id.clone(),
        sprint_name: sprint.name.clone(),
        sprint_goal: sprint.goal.clone(),
        start_date: sprint.start_date,
        end_date: sprint.end_date,
        completion_status: if story.is_done() {
            CompletionStatus::Completed
        } else {
            CompletionStatus::Incomplete
        },
        final_stage: story.sprint_status,
        stages_completed: story.stages_completed(),
        status_history: story.status_history.clone(),
        assignment_history: story.assignment_history.clone(),
        blockers: story.blockers.clone(),
        retrospective_notes: sprint.retrospective.clone(),
        estimate: story.estimate.clone(),
        recorded_at: now,
    }
}

/// Fail with `Conflict` unless the sprint is active.
pub fn ensure_completable(sprint: &Sprint) -> AppResult<()> {
    if sprint.status == SprintStatus::Active {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "cannot complete a {} sprint",
            status_name(sprint.status)
        )))
    }
}

/// Fail with `Conflict` if the sprint already ended.
pub fn ensure_cancellable(sprint: &Sprint) -> AppResult<()> {
    if sprint.status.is_terminal() {
        Err(AppError::Conflict(format!(
            "cannot cancel a {} sprint",
            status_name(sprint.status)
        )))
    } else {
        Ok(())
    }
}

/// Plan the completion of an active sprint.
///
/// `backlog` holds the referenced backlog stories by ID; stories missing
/// from it are skipped with a warning. Fails with `Conflict` unless the
/// sprint is active, before anything is computed.
pub fn plan_completion(
    sprint: &Sprint,
    backlog: &HashMap<String, BacklogStory>,
    now: DateTime<Utc>,
) -> AppResult<CompletionPlan> {
    ensure_completable(sprint)?;

    let mut plan = CompletionPlan {
        metrics: calculate_sprint_metrics(sprint),
        completed_story_ids: Vec::new(),
        reverted_to_backlog_ids: Vec::new(),
        skipped_story_ids: Vec::new(),
        story_updates: Vec::new(),
        touched_epic_ids: Vec::new(),
    };
    let mut epics = BTreeSet::new();

    for story in &sprint.stories {
        let Some(source) = backlog.get(&story.original_story_id) else {
            warn!(
                sprint_id = %sprint.id,
                story_id = %story.original_story_id,
                "Backlog story missing; skipping reconciliation"
            );
            plan.skipped_story_ids.push(story.original_story_id.clone());
            continue;
        };

        let mut attempts = source.sprint_attempts.clone();
        attempts.push(attempt_for(sprint, story, now));

        let patch = if story.is_done() {
            plan.completed_story_ids.push(source.id.clone());
            BacklogStoryPatch {
                status: Some(BacklogStatus::Completed),
                completed_at: Some(Some(story.completed_at.unwrap_or(now))),
                sprint_attempts: Some(attempts),
                ..BacklogStoryPatch::default()
            }
        } else {
            plan.reverted_to_backlog_ids.push(source.id.clone());
            BacklogStoryPatch {
                status: Some(BacklogStatus::Backlog),
                completed_at: Some(None),
                sprint_attempts: Some(attempts),
                ..BacklogStoryPatch::default()
            }
        };

        plan.story_updates.push(StoryUpdate::for_story(source, patch));
        if let Some(epic_id) = source.epic_id.as_ref().or(story.epic_id.as_ref()) {
            epics.insert(epic_id.clone());
        }
    }

    plan.touched_epic_ids = epics.into_iter().collect();
    Ok(plan)
}

/// Plan the cancellation of a draft or active sprint.
///
/// Referenced stories go back to the backlog without an attempt record.
pub fn plan_cancellation(
    sprint: &Sprint,
    backlog: &HashMap<String, BacklogStory>,
) -> AppResult<CancellationPlan> {
    ensure_cancellable(sprint)?;

    let mut plan = CancellationPlan {
        reverted_to_backlog_ids: Vec::new(),
        skipped_story_ids: Vec::new(),
        story_updates: Vec::new(),
        touched_epic_ids: Vec::new(),
    };
    let mut epics = BTreeSet::new();

    for story in &sprint.stories {
        let Some(source) = backlog.get(&story.original_story_id) else {
            warn!(
                sprint_id = %sprint.id,
                story_id = %story.original_story_id,
                "Backlog story missing; skipping revert"
            );
            plan.skipped_story_ids.push(story.original_story_id.clone());
            continue;
        };

        plan.reverted_to_backlog_ids.push(source.id.clone());
        plan.story_updates.push(StoryUpdate::for_story(
            source,
            BacklogStoryPatch {
                status: Some(BacklogStatus::Backlog),
                ..BacklogStoryPatch::default()
            },
        ));
        if let Some(epic_id) = &source.epic_id {
            epics.insert(epic_id.clone());
        }
    }

    plan.touched_epic_ids = epics.into_iter().collect();
    Ok(plan)
}

impl Sprint {
    /// Move to `completed` with the planned metrics.
    pub fn mark_completed(&mut self, plan: &CompletionPlan, now: DateTime<Utc>) {
        self.status = SprintStatus::Completed;
        self.metrics = Some(plan.metrics.clone());
        self.completed_at = Some(now);
    }

    /// Move to `cancelled`.
    pub fn mark_cancelled(&mut self) {
        self.status = SprintStatus::Cancelled;
    }
}
