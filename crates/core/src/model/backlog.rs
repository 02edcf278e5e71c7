//! Backlog stories, sprint attempts and epics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use sprintdeck_db::entities::backlog_story::BacklogStatus;
pub use sprintdeck_db::entities::epic::EpicStatus;

use super::sprint::{Blocker, Stage, StatusChange};

/// How a story left a sprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Incomplete,
}

/// Snapshot of one story's journey through one sprint.
///
/// Appended to the backlog story when the sprint completes; never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintAttempt {
    pub sprint_id: String,
    pub sprint_name: String,
    pub sprint_goal: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub completion_status: CompletionStatus,
    pub final_stage: Stage,
    pub stages_completed: Vec<Stage>,
    pub status_history: Vec<StatusChange>,
    pub assignment_history: Vec<String>,
    pub blockers: Vec<Blocker>,
    pub retrospective_notes: Option<String>,
    pub estimate: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// A story in a project backlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogStory {
    pub id: String,
    pub project_id: String,
    pub epic_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: BacklogStatus,
    pub estimate: Option<String>,
    #[serde(default)]
    pub sprint_attempts: Vec<SprintAttempt>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter for listing a project's backlog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklogFilter {
    pub status: Option<BacklogStatus>,
    pub epic_id: Option<String>,
}

impl BacklogFilter {
    /// Only stories available for planning.
    #[must_use]
    pub const fn available() -> Self {
        Self {
            status: Some(BacklogStatus::Backlog),
            epic_id: None,
        }
    }

    /// Whether `story` passes the filter.
    #[must_use]
    pub fn matches(&self, story: &BacklogStory) -> bool {
        self.status.is_none_or(|s| s == story.status)
            && self
                .epic_id
                .as_deref()
                .is_none_or(|e| story.epic_id.as_deref() == Some(e))
    }
}

/// Partial update of a backlog story. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklogStoryPatch {
    pub status: Option<BacklogStatus>,
    pub estimate: Option<Option<String>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    /// Full replacement of the attempt list.
    pub sprint_attempts: Option<Vec<SprintAttempt>>,
}

impl BacklogStoryPatch {
    /// Apply the patch in place.
    pub fn apply(&self, story: &mut BacklogStory, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            story.status = status;
        }
        if let Some(estimate) = &self.estimate {
            story.estimate.clone_from(estimate);
        }
        if let Some(completed_at) = self.completed_at {
            story.completed_at = completed_at;
        }
        if let Some(attempts) = &self.sprint_attempts {
            story.sprint_attempts.clone_from(attempts);
        }
        story.updated_at = now;
    }
}

/// Patch addressed to one backlog story, guarded by the state it was
/// planned against.
///
/// The write only lands while the stored story still has
/// `expected_updated_at` (and `expected_status`, when set). A story that
/// changed or vanished since it was read makes the whole commit report a
/// lost race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryUpdate {
    pub story_id: String,
    pub expected_status: Option<BacklogStatus>,
    pub expected_updated_at: DateTime<Utc>,
    pub patch: BacklogStoryPatch,
}

impl StoryUpdate {
    /// Patch `story` as it was just read.
    #[must_use]
    pub fn for_story(story: &BacklogStory, patch: BacklogStoryPatch) -> Self {
        Self {
            story_id: story.id.clone(),
            expected_status: None,
            expected_updated_at: story.updated_at,
            patch,
        }
    }

    /// Also require the stored status to still be `status`.
    #[must_use]
    pub const fn while_status(mut self, status: BacklogStatus) -> Self {
        self.expected_status = Some(status);
        self
    }

    /// Whether `story` is still in the state this update was planned against.
    #[must_use]
    pub fn still_applies_to(&self, story: &BacklogStory) -> bool {
        story.updated_at == self.expected_updated_at
            && self.expected_status.is_none_or(|s| s == story.status)
    }
}

/// A grouping of backlog stories with derived progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epic {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub story_count: u32,
    pub completed_story_count: u32,
    pub status: EpicStatus,
}

/// Epic status from its stories' statuses.
pub fn derive_epic_status(statuses: impl IntoIterator<Item = BacklogStatus>) -> EpicStatus {
    let mut total = 0;
    let mut completed = 0;
    let mut in_sprint = 0;

    for status in statuses {
        total += 1;
        match status {
            BacklogStatus::Completed => completed += 1,
            BacklogStatus::InSprint => in_sprint += 1,
            BacklogStatus::Backlog => {}
        }
    }

    epic_status_from_counts(total, completed, in_sprint)
}

/// Epic status from story counts.
///
/// No stories: planning. All completed: completed. Any completed or in a
/// sprint: active. Otherwise planning.
#[must_use]
pub const fn epic_status_from_counts(total: u64, completed: u64, in_sprint: u64) -> EpicStatus {
    if total == 0 {
        EpicStatus::Planning
    } else if completed == total {
        EpicStatus::Completed
    } else if completed > 0 || in_sprint > 0 {
        EpicStatus::Active
    } else {
        EpicStatus::Planning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BacklogStatus::{Backlog, Completed, InSprint};

    #[test]
    fn test_derive_epic_status() {
        assert_eq!(derive_epic_status([]), EpicStatus::Planning);
        assert_eq!(derive_epic_status([Backlog, Backlog]), EpicStatus::Planning);
        assert_eq!(derive_epic_status([Backlog, InSprint]), EpicStatus::Active);
        assert_eq!(derive_epic_status([Completed, Backlog]), EpicStatus::Active);
        assert_eq!(
            derive_epic_status([Completed, Completed]),
            EpicStatus::Completed
        );
    }

    #[test]
    fn test_story_update_guard() {
        let now = Utc::now();
        let mut story = BacklogStory {
            id: "b1".to_string(),
            project_id: "p1".to_string(),
            epic_id: None,
            title: "Export CSV".to_string(),
            description: None,
            status: Backlog,
            estimate: None,
            sprint_attempts: Vec::new(),
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let update = StoryUpdate::for_story(&story, BacklogStoryPatch::default())
            .while_status(Backlog);
        assert!(update.still_applies_to(&story));

        story.status = InSprint;
        assert!(!update.still_applies_to(&story));

        story.status = Backlog;
        story.updated_at = now + chrono::Duration::seconds(1);
        assert!(!update.still_applies_to(&story));
    }

    #[test]
    fn test_filter_matches() {
        let now = Utc::now();
        let story = BacklogStory {
            id: "b1".to_string(),
            project_id: "p1".to_string(),
            epic_id: Some("e1".to_string()),
            title: "Export CSV".to_string(),
            description: None,
            status: Backlog,
            estimate: None,
            sprint_attempts: Vec::new(),
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        assert!(BacklogFilter::default().matches(&story));
        assert!(BacklogFilter::available().matches(&story));
        assert!(
            !BacklogFilter {
                status: Some(InSprint),
                epic_id: None
            }
            .matches(&story)
        );
        assert!(
            !BacklogFilter {
                status: None,
                epic_id: Some("e2".to_string())
            }
            .matches(&story)
        );
    }
}
