//! Sprint board operations.
//!
//! Stories move through the workflow stages while the sprint is active.
//! Every operation checks the caller's capabilities before touching the
//! document.

use chrono::{DateTime, Utc};
use sprintdeck_common::{AppError, AppResult};
use tracing::info;

use crate::access::{Capabilities, Capability};
use crate::model::{
    BacklogStatus, BacklogStory, Blocker, Mutation, Sprint, SprintStatus, SprintStory, Stage,
    StatusChange,
};

const MAX_NAME_LEN: usize = 128;
const MAX_BLOCKER_LEN: usize = 1000;
const MAX_RETROSPECTIVE_LEN: usize = 10_000;

/// Fields of a new sprint.
#[derive(Debug, Clone)]
pub struct SprintDraft {
    pub project_id: String,
    pub name: String,
    pub goal: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub allow_guest_access: bool,
}

impl Sprint {
    /// Build a draft sprint hosted by `host_id`.
    pub fn create(
        id: String,
        host_id: &str,
        draft: SprintDraft,
        password_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("sprint name cannot be blank".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::Validation(format!(
                "sprint name is longer than {MAX_NAME_LEN} characters"
            )));
        }
        if draft.end_date <= draft.start_date {
            return Err(AppError::Validation(
                "sprint must end after it starts".to_string(),
            ));
        }

        Ok(Self {
            id,
            project_id: draft.project_id,
            name: name.to_string(),
            goal: draft
                .goal
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty()),
            host_id: host_id.to_string(),
            status: SprintStatus::Draft,
            start_date: draft.start_date,
            end_date: draft.end_date,
            stories: Vec::new(),
            retrospective: None,
            metrics: None,
            password_hash,
            allow_guest_access: draft.allow_guest_access,
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    fn require_active(&self) -> AppResult<()> {
        if self.status == SprintStatus::Active {
            Ok(())
        } else {
            Err(AppError::Conflict(format!(
                "sprint is {}, not active",
                status_name(self.status)
            )))
        }
    }

    fn story_or_not_found(&mut self, story_id: &str) -> AppResult<&mut SprintStory> {
        self.story_mut(story_id)
            .ok_or_else(|| AppError::NotFound(format!("Sprint story not found: {story_id}")))
    }

    /// Put a backlog story on the board in `todo`.
    ///
    /// The caller is responsible for marking the backlog story `in_sprint`.
    pub fn add_story(
        &mut self,
        caps: &Capabilities,
        id: String,
        source: &BacklogStory,
    ) -> AppResult<&SprintStory> {
        caps.require(Capability::CreateStory)?;

        if self.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "sprint is {}",
                status_name(self.status)
            )));
        }
        if self.stories.iter().any(|s| s.original_story_id == source.id) {
            return Err(AppError::Conflict(format!(
                "story {} is already in this sprint",
                source.id
            )));
        }
        if source.status != BacklogStatus::Backlog {
            return Err(AppError::Conflict(format!(
                "story {} is not available for planning",
                source.id
            )));
        }

        self.stories.push(SprintStory {
            id,
            original_story_id: source.id.clone(),
            title: source.title.clone(),
            description: source.description.clone(),
            estimate: source.estimate.clone(),
            epic_id: source.epic_id.clone(),
            sprint_status: Stage::Todo,
            column_id: Stage::Todo.as_str().to_string(),
            progress: 0,
            blockers: Vec::new(),
            status_history: Vec::new(),
            assigned_to: None,
            assignment_history: Vec::new(),
            started_at: None,
            completed_at: None,
        });
        self.stories
            .last()
            .ok_or_else(|| AppError::Internal("story vanished after insert".to_string()))
    }

    /// `draft` to `active`.
    pub fn start(&mut self, caps: &Capabilities) -> AppResult<Mutation> {
        caps.require(Capability::StartSprint)?;

        if self.status != SprintStatus::Draft {
            return Err(AppError::Conflict(format!(
                "sprint is {}, not draft",
                status_name(self.status)
            )));
        }
        self.status = SprintStatus::Active;
        info!(sprint_id = %self.id, stories = self.stories.len(), "Sprint started");
        Ok(Mutation::Applied)
    }

    /// Move a story to another stage.
    pub fn move_story(
        &mut self,
        caps: &Capabilities,
        story_id: &str,
        to: Stage,
        changed_by: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Mutation> {
        caps.require(Capability::MoveStories)?;
        caps.require(Capability::MoveTo(to))?;
        self.require_active()?;

        let story = self.story_or_not_found(story_id)?;
        let from = story.sprint_status;
        if from == to {
            return Ok(Mutation::Unchanged);
        }

        story.status_history.push(StatusChange {
            from: Some(from),
            to,
            changed_by: changed_by.to_string(),
            changed_at: now,
        });
        story.sprint_status = to;
        story.column_id = to.as_str().to_string();

        if from == Stage::Todo && story.started_at.is_none() {
            story.started_at = Some(now);
        }
        if to == Stage::Done {
            story.completed_at = Some(now);
            story.progress = 100;
        } else if from == Stage::Done {
            story.completed_at = None;
        }

        Ok(Mutation::Applied)
    }

    /// Assign a story, or clear the assignee with `None`.
    pub fn assign_story(
        &mut self,
        caps: &Capabilities,
        story_id: &str,
        assignee: Option<String>,
    ) -> AppResult<Mutation> {
        caps.require(Capability::EditStory)?;
        self.require_active()?;

        let story = self.story_or_not_found(story_id)?;
        if story.assigned_to == assignee {
            return Ok(Mutation::Unchanged);
        }
        if let Some(user) = &assignee
            && story.assignment_history.last() != Some(user)
        {
            story.assignment_history.push(user.clone());
        }
        story.assigned_to = assignee;
        Ok(Mutation::Applied)
    }

    /// Set a story's progress percentage.
    pub fn update_progress(
        &mut self,
        caps: &Capabilities,
        story_id: &str,
        progress: u8,
    ) -> AppResult<Mutation> {
        caps.require(Capability::EditStory)?;
        if progress > 100 {
            return Err(AppError::Validation(
                "progress must be between 0 and 100".to_string(),
            ));
        }
        self.require_active()?;

        let story = self.story_or_not_found(story_id)?;
        if story.progress == progress {
            return Ok(Mutation::Unchanged);
        }
        story.progress = progress;
        Ok(Mutation::Applied)
    }

    /// Report something blocking a story.
    pub fn report_blocker(
        &mut self,
        caps: &Capabilities,
        story_id: &str,
        blocker_id: String,
        description: &str,
        reported_by: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Mutation> {
        caps.require(Capability::EditStory)?;
        let description = description.trim();
        if description.is_empty() || description.chars().count() > MAX_BLOCKER_LEN {
            return Err(AppError::Validation(format!(
                "blocker description must be 1 to {MAX_BLOCKER_LEN} characters"
            )));
        }
        self.require_active()?;

        let story = self.story_or_not_found(story_id)?;
        story.blockers.push(Blocker {
            id: blocker_id,
            description: description.to_string(),
            reported_by: reported_by.to_string(),
            created_at: now,
            resolved_at: None,
        });
        Ok(Mutation::Applied)
    }

    /// Mark a blocker resolved. Resolving twice is a no-op.
    pub fn resolve_blocker(
        &mut self,
        caps: &Capabilities,
        story_id: &str,
        blocker_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Mutation> {
        caps.require(Capability::EditStory)?;
        self.require_active()?;

        let story = self.story_or_not_found(story_id)?;
        let blocker = story
            .blockers
            .iter_mut()
            .find(|b| b.id == blocker_id)
            .ok_or_else(|| AppError::NotFound(format!("Blocker not found: {blocker_id}")))?;

        if !blocker.is_open() {
            return Ok(Mutation::Unchanged);
        }
        blocker.resolved_at = Some(now);
        Ok(Mutation::Applied)
    }

    /// Record retrospective notes.
    pub fn set_retrospective(&mut self, caps: &Capabilities, notes: &str) -> AppResult<Mutation> {
        caps.require(Capability::EndSprint)?;
        if notes.chars().count() > MAX_RETROSPECTIVE_LEN {
            return Err(AppError::Validation(format!(
                "retrospective is longer than {MAX_RETROSPECTIVE_LEN} characters"
            )));
        }
        self.require_active()?;

        let notes = Some(notes.trim().to_string()).filter(|n| !n.is_empty());
        if self.retrospective == notes {
            return Ok(Mutation::Unchanged);
        }
        self.retrospective = notes;
        Ok(Mutation::Applied)
    }
}

pub(crate) const fn status_name(status: SprintStatus) -> &'static str {
    match status {
        SprintStatus::Draft => "draft",
        SprintStatus::Active => "active",
        SprintStatus::Completed => "completed",
        SprintStatus::Cancelled => "cancelled",
    }
}
