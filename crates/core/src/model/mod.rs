//! Domain documents.
//!
//! These are the types the engines operate on. All timestamps are
//! `DateTime<Utc>`; storage representations are converted in
//! [`crate::store::sea`].

mod backlog;
mod session;
mod sprint;

pub use backlog::{
    BacklogFilter, BacklogStatus, BacklogStory, BacklogStoryPatch, CompletionStatus, Epic,
    EpicStatus, SprintAttempt, StoryUpdate, derive_epic_status, epic_status_from_counts,
};
pub use session::{Participant, SessionAggregate, SessionStory, VotingPhase, VotingRound};
pub use sprint::{Blocker, Sprint, SprintMetrics, SprintStatus, SprintStory, Stage, StatusChange};

/// Result of applying an operation to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Mutation {
    /// The document changed and must be written.
    Applied,
    /// The operation was a no-op; nothing is written or broadcast.
    Unchanged,
}

impl Mutation {
    /// Whether the document changed.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Round to one decimal place.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole` as a percentage with one decimal; zero when `whole` is zero.
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(part as f64 / whole as f64 * 100.0)
    }
}
