//! Database entities.
//!
//! Session and sprint rows are documents: nested collections (participants,
//! stories, voting history, sprint attempts) live in JSONB columns and each
//! document carries a `version` used for compare-and-swap writes.

#![allow(missing_docs)]

pub mod backlog_story;
pub mod epic;
pub mod planning_session;
pub mod sprint;

pub use backlog_story::Entity as BacklogStory;
pub use epic::Entity as Epic;
pub use planning_session::Entity as PlanningSession;
pub use sprint::Entity as Sprint;
