//! Business logic services.

#![allow(missing_docs)]

pub mod epic;
pub mod event_publisher;
pub mod housekeeping;
pub mod session;
pub mod sprint;

pub use epic::EpicService;
pub use event_publisher::{
    EventPublisher, EventPublisherService, NoOpEventPublisher, StreamEvent, Topic,
};
pub use housekeeping::spawn_participant_sweep;
pub use session::{AddSessionStoryInput, CreateSessionInput, SessionService};
pub use sprint::{CreateSprintInput, ReportBlockerInput, SprintService};
