//! Repositories.
//!
//! Thin wrappers over sea-orm queries. Every database failure surfaces as
//! [`AppError::TransientStore`](sprintdeck_common::AppError::TransientStore).

pub mod backlog_story;
pub mod epic;
pub mod planning_session;
pub mod sprint;

pub use backlog_story::BacklogStoryRepository;
pub use epic::EpicRepository;
pub use planning_session::PlanningSessionRepository;
pub use sprint::{GuardedStoryWrite, SprintRepository};
