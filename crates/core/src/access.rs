//! Role-based capability resolution.
//!
//! Capabilities come from a fixed table keyed by team role. The host of a
//! session or sprint always holds every capability.

use std::fmt;

use serde::Serialize;
use sprintdeck_common::{AppError, AppResult};

use crate::model::Stage;

/// Team role of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ProductOwner,
    ScrumMaster,
    BusinessAnalyst,
    Developer,
    Tester,
    /// Read-only. Also the fallback for unrecognised roles.
    #[default]
    Stakeholder,
}

impl Role {
    /// Parse a role name. Anything unrecognised is a stakeholder.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "product_owner" => Self::ProductOwner,
            "scrum_master" => Self::ScrumMaster,
            "business_analyst" => Self::BusinessAnalyst,
            "developer" => Self::Developer,
            "tester" => Self::Tester,
            _ => Self::Stakeholder,
        }
    }

    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProductOwner => "product_owner",
            Self::ScrumMaster => "scrum_master",
            Self::BusinessAnalyst => "business_analyst",
            Self::Developer => "developer",
            Self::Tester => "tester",
            Self::Stakeholder => "stakeholder",
        }
    }
}

/// A single permission checked before a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CreateStory,
    EditStory,
    DeleteStory,
    MoveStories,
    MoveTo(Stage),
    StartSprint,
    EndSprint,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateStory => "canCreateStory",
            Self::EditStory => "canEditStory",
            Self::DeleteStory => "canDeleteStory",
            Self::MoveStories => "canMoveStories",
            Self::MoveTo(Stage::Todo) => "canMoveToTodo",
            Self::MoveTo(Stage::InProgress) => "canMoveToInProgress",
            Self::MoveTo(Stage::Review) => "canMoveToReview",
            Self::MoveTo(Stage::Testing) => "canMoveToTesting",
            Self::MoveTo(Stage::Done) => "canMoveToDone",
            Self::StartSprint => "canStartSprint",
            Self::EndSprint => "canEndSprint",
        };
        f.write_str(name)
    }
}

/// Resolved capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    pub can_create_story: bool,
    pub can_edit_story: bool,
    pub can_delete_story: bool,
    pub can_move_stories: bool,
    pub can_move_to_todo: bool,
    pub can_move_to_in_progress: bool,
    pub can_move_to_review: bool,
    pub can_move_to_testing: bool,
    pub can_move_to_done: bool,
    pub can_start_sprint: bool,
    pub can_end_sprint: bool,
}

impl Capabilities {
    /// Every capability.
    pub const ALL: Self = Self {
        can_create_story: true,
        can_edit_story: true,
        can_delete_story: true,
        can_move_stories: true,
        can_move_to_todo: true,
        can_move_to_in_progress: true,
        can_move_to_review: true,
        can_move_to_testing: true,
        can_move_to_done: true,
        can_start_sprint: true,
        can_end_sprint: true,
    };

    /// No capability at all.
    pub const NONE: Self = Self {
        can_create_story: false,
        can_edit_story: false,
        can_delete_story: false,
        can_move_stories: false,
        can_move_to_todo: false,
        can_move_to_in_progress: false,
        can_move_to_review: false,
        can_move_to_testing: false,
        can_move_to_done: false,
        can_start_sprint: false,
        can_end_sprint: false,
    };

    /// Static capability table for a role.
    #[must_use]
    pub const fn for_role(role: Role) -> Self {
        match role {
            Role::ProductOwner => Self::ALL,
            Role::ScrumMaster => Self {
                can_delete_story: false,
                ..Self::ALL
            },
            Role::BusinessAnalyst => Self {
                can_create_story: true,
                can_edit_story: true,
                can_move_stories: true,
                can_move_to_todo: true,
                can_move_to_in_progress: true,
                can_move_to_review: true,
                ..Self::NONE
            },
            Role::Developer => Self {
                can_edit_story: true,
                can_move_stories: true,
                can_move_to_todo: true,
                can_move_to_in_progress: true,
                can_move_to_review: true,
                ..Self::NONE
            },
            Role::Tester => Self {
                can_edit_story: true,
                can_move_stories: true,
                can_move_to_review: true,
                can_move_to_testing: true,
                can_move_to_done: true,
                ..Self::NONE
            },
            Role::Stakeholder => Self::NONE,
        }
    }

    /// Capabilities of a caller with `role`; the host gets everything.
    #[must_use]
    pub const fn resolve(role: Role, is_host: bool) -> Self {
        if is_host {
            Self::ALL
        } else {
            Self::for_role(role)
        }
    }

    /// Whether the capability is held.
    #[must_use]
    pub const fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::CreateStory => self.can_create_story,
            Capability::EditStory => self.can_edit_story,
            Capability::DeleteStory => self.can_delete_story,
            Capability::MoveStories => self.can_move_stories,
            Capability::MoveTo(stage) => self.can_move_to(stage),
            Capability::StartSprint => self.can_start_sprint,
            Capability::EndSprint => self.can_end_sprint,
        }
    }

    /// Whether a story may be moved into `stage`.
    #[must_use]
    pub const fn can_move_to(&self, stage: Stage) -> bool {
        match stage {
            Stage::Todo => self.can_move_to_todo,
            Stage::InProgress => self.can_move_to_in_progress,
            Stage::Review => self.can_move_to_review,
            Stage::Testing => self.can_move_to_testing,
            Stage::Done => self.can_move_to_done,
        }
    }

    /// Fail with [`AppError::Permission`] unless the capability is held.
    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(AppError::Permission(format!("missing {capability}")))
        }
    }
}

/// Authenticated caller of a core operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Stable user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Team role.
    pub role: Role,
}

impl Actor {
    /// Create an actor.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }

    /// Capabilities against a document hosted by `host_id`.
    #[must_use]
    pub fn capabilities(&self, host_id: &str) -> Capabilities {
        Capabilities::resolve(self.role, self.id == host_id)
    }
}
