//! Sprint board documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use sprintdeck_db::entities::sprint::SprintStatus;

/// Workflow stage of a sprint story. Each stage is one board column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Todo,
    InProgress,
    Review,
    Testing,
    Done,
}

impl Stage {
    /// All stages in workflow order.
    pub const ALL: [Self; 5] = [
        Self::Todo,
        Self::InProgress,
        Self::Review,
        Self::Testing,
        Self::Done,
    ];

    /// Wire name, also used as the column ID.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Testing => "testing",
            Self::Done => "done",
        }
    }
}

/// Something stopping a story from progressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blocker {
    pub id: String,
    pub description: String,
    pub reported_by: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Blocker {
    /// Whether the blocker is still open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// One stage transition of a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from: Option<Stage>,
    pub to: Stage,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// A backlog story placed on a sprint board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintStory {
    pub id: String,
    /// Backlog story this card wraps.
    pub original_story_id: String,
    pub title: String,
    pub description: Option<String>,
    pub estimate: Option<String>,
    pub epic_id: Option<String>,
    pub sprint_status: Stage,
    /// Always the wire name of `sprint_status`.
    pub column_id: String,
    /// 0 to 100.
    pub progress: u8,
    #[serde(default)]
    pub blockers: Vec<Blocker>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub assignment_history: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SprintStory {
    /// Whether the story reached the last stage.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.sprint_status == Stage::Done
    }

    /// Numeric story points, if the estimate is a number.
    #[must_use]
    pub fn points(&self) -> Option<f64> {
        self.estimate.as_deref().and_then(|e| e.trim().parse::<f64>().ok())
    }

    /// Stages the story got past, in workflow order.
    ///
    /// A stage counts once the story has been in it and then moved further
    /// along. `Done` counts when it is the final stage.
    #[must_use]
    pub fn stages_completed(&self) -> Vec<Stage> {
        let visited = |stage: Stage| {
            stage == Stage::Todo
                || self
                    .status_history
                    .iter()
                    .any(|c| c.to == stage || c.from == Some(stage))
        };

        Stage::ALL
            .into_iter()
            .filter(|&stage| {
                if stage == Stage::Done {
                    self.is_done()
                } else {
                    stage < self.sprint_status && visited(stage)
                }
            })
            .collect()
    }
}

/// Figures computed when a sprint is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintMetrics {
    pub planned_points: f64,
    pub completed_points: f64,
    pub planned_stories: usize,
    pub completed_stories: usize,
    /// Completed stories as a percentage of planned stories.
    pub completion_rate: f64,
    /// Mean `startedAt` to `completedAt` of done stories, in hours.
    pub average_cycle_time_hours: f64,
    /// Completed stories per sprint day.
    pub throughput: f64,
}

/// A dated, role-gated board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub goal: Option<String>,
    pub host_id: String,
    pub status: SprintStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub stories: Vec<SprintStory>,
    pub retrospective: Option<String>,
    pub metrics: Option<SprintMetrics>,
    /// Argon2 PHC string. Never sent to clients.
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,
    pub allow_guest_access: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Sprint {
    /// Whether `user_id` hosts this sprint.
    #[must_use]
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    /// Look up a story by its sprint ID.
    #[must_use]
    pub fn story(&self, id: &str) -> Option<&SprintStory> {
        self.stories.iter().find(|s| s.id == id)
    }

    /// Look up a story by its sprint ID, mutably.
    pub fn story_mut(&mut self, id: &str) -> Option<&mut SprintStory> {
        self.stories.iter_mut().find(|s| s.id == id)
    }

    /// Record a write: stamp `updated_at` and bump `version`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story_at(stage: Stage, history: &[(Option<Stage>, Stage)]) -> SprintStory {
        let now = Utc::now();
        SprintStory {
            id: "s1".to_string(),
            original_story_id: "b1".to_string(),
            title: "Story".to_string(),
            description: None,
            estimate: Some("3".to_string()),
            epic_id: None,
            sprint_status: stage,
            column_id: stage.as_str().to_string(),
            progress: 0,
            blockers: Vec::new(),
            status_history: history
                .iter()
                .map(|&(from, to)| StatusChange {
                    from,
                    to,
                    changed_by: "u1".to_string(),
                    changed_at: now,
                })
                .collect(),
            assigned_to: None,
            assignment_history: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_stages_completed_for_done_story() {
        let story = story_at(
            Stage::Done,
            &[
                (Some(Stage::Todo), Stage::InProgress),
                (Some(Stage::InProgress), Stage::Review),
                (Some(Stage::Review), Stage::Done),
            ],
        );
        assert_eq!(
            story.stages_completed(),
            vec![Stage::Todo, Stage::InProgress, Stage::Review, Stage::Done]
        );
    }

    #[test]
    fn test_stages_completed_for_unstarted_story() {
        let story = story_at(Stage::Todo, &[]);
        assert!(story.stages_completed().is_empty());
    }

    #[test]
    fn test_points_parse() {
        let mut story = story_at(Stage::Todo, &[]);
        assert_eq!(story.points(), Some(3.0));
        story.estimate = Some("XL".to_string());
        assert_eq!(story.points(), None);
    }
}
