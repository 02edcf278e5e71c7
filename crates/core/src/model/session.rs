//! Planning session documents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deck::Deck;

/// Someone in a planning session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    /// Hidden vote for the open round.
    pub vote: Option<String>,
}

/// One finished vote/reveal/end cycle. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingRound {
    pub id: String,
    /// Participant ID to card.
    pub votes: BTreeMap<String, String>,
    /// Participant ID to display name at the time of the round.
    pub participant_names: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_estimate: Option<String>,
}

/// A story being estimated in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStory {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub estimate: Option<String>,
    pub is_estimated: bool,
    #[serde(default)]
    pub voting_history: Vec<VotingRound>,
    /// Backlog story this was imported from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_story_id: Option<String>,
}

impl SessionStory {
    /// The most recent recorded round.
    #[must_use]
    pub fn latest_round(&self) -> Option<&VotingRound> {
        self.voting_history.last()
    }
}

/// Phase of the voting round state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingPhase {
    /// No story is being voted on.
    Idle,
    /// Votes are accepted and hidden.
    Voting,
    /// Votes are visible; no new votes are accepted.
    Revealed,
}

/// A planning session: participants, stories and the current round.
///
/// Persisted as a single document and broadcast in full on every change.
/// `version` increases by one with each write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAggregate {
    pub id: String,
    pub name: String,
    pub host_id: String,
    pub participants: Vec<Participant>,
    pub stories: Vec<SessionStory>,
    pub current_story_id: Option<String>,
    pub voting_in_progress: bool,
    pub votes_revealed: bool,
    pub deck: Deck,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl SessionAggregate {
    /// Current phase, derived from the round flags.
    #[must_use]
    pub const fn phase(&self) -> VotingPhase {
        match (self.voting_in_progress, self.votes_revealed) {
            (true, false) => VotingPhase::Voting,
            (true, true) => VotingPhase::Revealed,
            (false, _) => VotingPhase::Idle,
        }
    }

    /// Whether `user_id` hosts this session.
    #[must_use]
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    /// Look up a participant.
    #[must_use]
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Look up a story.
    #[must_use]
    pub fn story(&self, id: &str) -> Option<&SessionStory> {
        self.stories.iter().find(|s| s.id == id)
    }

    /// The story of the open round.
    #[must_use]
    pub fn current_story(&self) -> Option<&SessionStory> {
        self.current_story_id.as_deref().and_then(|id| self.story(id))
    }

    /// A round is open iff a current story is set and exists.
    #[must_use]
    pub fn round_is_consistent(&self) -> bool {
        self.voting_in_progress == self.current_story().is_some()
            && (self.voting_in_progress || self.current_story_id.is_none())
            && (!self.votes_revealed || self.voting_in_progress)
    }

    /// Record a write: stamp `updated_at` and bump `version`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}
