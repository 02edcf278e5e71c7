//! Voting round state machine.
//!
//! ```text
//! Idle --start--> Voting --reveal--> Revealed --end--> Idle
//!                   |                    |
//!                   +-------end----------+        (re-vote: start again)
//! ```
//!
//! Every transition checks the caller's [`Capabilities`] first and returns
//! a typed error instead of silently ignoring a request.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sprintdeck_common::{AppError, AppResult};
use tracing::info;

use crate::access::{Capabilities, Capability};
use crate::model::{Mutation, SessionAggregate, VotingPhase, VotingRound};

const MAX_ESTIMATE_LEN: usize = 32;

impl SessionAggregate {
    /// Open a round on `story_id`, clearing every participant's vote.
    pub fn start_voting(&mut self, caps: &Capabilities, story_id: &str) -> AppResult<Mutation> {
        caps.require(Capability::MoveStories)?;

        if !self.is_active {
            return Err(AppError::Conflict("session has ended".to_string()));
        }
        if self.story(story_id).is_none() {
            return Err(AppError::NotFound(format!("Story not found: {story_id}")));
        }
        if self.phase() != VotingPhase::Idle {
            return Err(AppError::Conflict(
                "a voting round is already open".to_string(),
            ));
        }

        self.current_story_id = Some(story_id.to_string());
        self.voting_in_progress = true;
        self.votes_revealed = false;
        for participant in &mut self.participants {
            participant.vote = None;
        }

        info!(session_id = %self.id, story_id, "Voting started");
        Ok(Mutation::Applied)
    }

    /// Set `participant_id`'s vote. Only that participant's slot changes.
    pub fn cast_vote(&mut self, participant_id: &str, value: &str) -> AppResult<Mutation> {
        let phase = self.phase();
        let deck_has_card = self.deck.contains(value);

        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| AppError::NotFound(format!("Participant not found: {participant_id}")))?;

        match phase {
            VotingPhase::Voting => {}
            VotingPhase::Idle => {
                return Err(AppError::Conflict("no voting round is open".to_string()));
            }
            VotingPhase::Revealed => {
                return Err(AppError::Conflict("votes are already revealed".to_string()));
            }
        }
        if !deck_has_card {
            return Err(AppError::Validation(format!(
                "'{value}' is not a card in this session's deck"
            )));
        }

        if participant.vote.as_deref() == Some(value) {
            return Ok(Mutation::Unchanged);
        }
        participant.vote = Some(value.to_string());
        Ok(Mutation::Applied)
    }

    /// Make the votes of the open round visible. Revealing twice is a no-op.
    pub fn reveal_votes(&mut self, caps: &Capabilities) -> AppResult<Mutation> {
        caps.require(Capability::MoveStories)?;

        match self.phase() {
            VotingPhase::Idle => Err(AppError::Conflict("no voting round is open".to_string())),
            VotingPhase::Revealed => Ok(Mutation::Unchanged),
            VotingPhase::Voting => {
                self.votes_revealed = true;
                info!(session_id = %self.id, "Votes revealed");
                Ok(Mutation::Applied)
            }
        }
    }

    /// Close the open round and record it in the story's history.
    ///
    /// Accepted from `Revealed` and directly from `Voting`. Without a final
    /// estimate the round is recorded but the story stays unestimated.
    pub fn end_voting(
        &mut self,
        caps: &Capabilities,
        final_estimate: Option<&str>,
        round_id: String,
        now: DateTime<Utc>,
    ) -> AppResult<Mutation> {
        caps.require(Capability::MoveStories)?;

        if self.phase() == VotingPhase::Idle {
            return Err(AppError::Conflict("no voting round is open".to_string()));
        }

        let final_estimate = final_estimate.map(str::trim).map(str::to_string);
        if let Some(estimate) = &final_estimate {
            if estimate.is_empty() {
                return Err(AppError::Validation(
                    "final estimate cannot be blank".to_string(),
                ));
            }
            if estimate.chars().count() > MAX_ESTIMATE_LEN {
                return Err(AppError::Validation(format!(
                    "final estimate is longer than {MAX_ESTIMATE_LEN} characters"
                )));
            }
        }

        let story_id = self
            .current_story_id
            .clone()
            .ok_or_else(|| AppError::Internal("open round without a story".to_string()))?;

        let mut votes = BTreeMap::new();
        let mut participant_names = BTreeMap::new();
        for participant in &self.participants {
            if let Some(vote) = &participant.vote {
                votes.insert(participant.id.clone(), vote.clone());
                participant_names.insert(participant.id.clone(), participant.name.clone());
            }
        }

        let story = self
            .stories
            .iter_mut()
            .find(|s| s.id == story_id)
            .ok_or_else(|| AppError::NotFound(format!("Story not found: {story_id}")))?;

        story.voting_history.push(VotingRound {
            id: round_id,
            votes,
            participant_names,
            timestamp: now,
            final_estimate: final_estimate.clone(),
        });
        story.is_estimated = final_estimate.is_some();
        story.estimate = final_estimate;

        info!(
            session_id = %self.id,
            story_id = %story.id,
            rounds = story.voting_history.len(),
            estimated = story.is_estimated,
            "Voting ended"
        );

        self.close_round();
        Ok(Mutation::Applied)
    }

    /// Reset to `Idle` and clear every vote without recording anything.
    pub(crate) fn close_round(&mut self) {
        self.current_story_id = None;
        self.voting_in_progress = false;
        self.votes_revealed = false;
        for participant in &mut self.participants {
            participant.vote = None;
        }
    }

    /// Every online participant has voted. False with nobody online.
    #[must_use]
    pub fn all_online_participants_voted(&self) -> bool {
        let mut online = self.participants.iter().filter(|p| p.is_online).peekable();
        online.peek().is_some() && online.all(|p| p.vote.is_some())
    }

    /// Every participant, online or not, has voted. False with nobody in
    /// the session.
    #[must_use]
    pub fn all_known_participants_voted(&self) -> bool {
        !self.participants.is_empty() && self.participants.iter().all(|p| p.vote.is_some())
    }

    /// Card to count for the revealed round; `None` until votes are revealed.
    #[must_use]
    pub fn vote_summary(&self) -> Option<BTreeMap<String, usize>> {
        if self.phase() != VotingPhase::Revealed {
            return None;
        }

        let mut summary = BTreeMap::new();
        for vote in self.participants.iter().filter_map(|p| p.vote.as_ref()) {
            *summary.entry(vote.clone()).or_insert(0) += 1;
        }
        Some(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::deck::Deck;
    use crate::model::{Participant, SessionStory};

    fn participant(id: &str, is_host: bool) -> Participant {
        Participant {
            id: id.to_string(),
            name: id.to_uppercase(),
            is_host,
            is_online: true,
            last_seen: Utc::now(),
            vote: None,
        }
    }

    fn session(deck: Deck) -> SessionAggregate {
        let now = Utc::now();
        SessionAggregate {
            id: "sess".to_string(),
            name: "Refinement".to_string(),
            host_id: "host".to_string(),
            participants: vec![
                participant("host", true),
                participant("a", false),
                participant("b", false),
            ],
            stories: vec![SessionStory {
                id: "st1".to_string(),
                title: "Login".to_string(),
                description: String::new(),
                estimate: None,
                is_estimated: false,
                voting_history: Vec::new(),
                original_story_id: None,
            }],
            current_story_id: None,
            voting_in_progress: false,
            votes_revealed: false,
            deck,
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[test]
    fn test_fibonacci_round_scenario() {
        let mut s = session(Deck::Fibonacci);
        let caps = Capabilities::ALL;

        s.start_voting(&caps, "st1").unwrap();
        assert_eq!(s.phase(), VotingPhase::Voting);
        assert!(s.round_is_consistent());

        s.cast_vote("host", "5").unwrap();
        s.cast_vote("a", "5").unwrap();
        s.cast_vote("b", "8").unwrap();
        assert!(s.all_online_participants_voted());

        s.reveal_votes(&caps).unwrap();
        let summary = s.vote_summary().unwrap();
        assert_eq!(summary.get("5"), Some(&2));
        assert_eq!(summary.get("8"), Some(&1));

        s.end_voting(&caps, Some("5"), "r1".into(), Utc::now())
            .unwrap();

        let story = s.story("st1").unwrap();
        assert!(story.is_estimated);
        assert_eq!(story.estimate.as_deref(), Some("5"));
        assert_eq!(story.voting_history.len(), 1);
        assert_eq!(story.voting_history[0].votes.len(), 3);
        assert_eq!(story.voting_history[0].participant_names["a"], "A");
        assert_eq!(s.phase(), VotingPhase::Idle);
        assert!(s.participants.iter().all(|p| p.vote.is_none()));
        assert!(s.round_is_consistent());
    }

    #[test]
    fn test_revote_without_estimate() {
        let mut s = session(Deck::TShirt);
        let caps = Capabilities::ALL;

        s.start_voting(&caps, "st1").unwrap();
        s.cast_vote("host", "S").unwrap();
        s.cast_vote("a", "M").unwrap();
        s.cast_vote("b", "L").unwrap();
        s.reveal_votes(&caps).unwrap();
        s.end_voting(&caps, None, "r1".into(), Utc::now()).unwrap();

        let story = s.story("st1").unwrap();
        assert!(!story.is_estimated);
        assert_eq!(story.voting_history.len(), 1);
        assert!(story.voting_history[0].final_estimate.is_none());

        s.start_voting(&caps, "st1").unwrap();
        s.cast_vote("a", "M").unwrap();
        s.end_voting(&caps, Some("M"), "r2".into(), Utc::now())
            .unwrap();

        let story = s.story("st1").unwrap();
        assert_eq!(story.voting_history.len(), 2);
        assert_eq!(story.voting_history[0].votes.len(), 3);
        assert_eq!(story.voting_history[1].votes.len(), 1);
    }

    #[test]
    fn test_vote_after_reveal_is_rejected() {
        let mut s = session(Deck::Fibonacci);
        let caps = Capabilities::ALL;

        s.start_voting(&caps, "st1").unwrap();
        s.cast_vote("a", "3").unwrap();
        s.reveal_votes(&caps).unwrap();

        let late = s.cast_vote("b", "13");
        assert!(matches!(late, Err(AppError::Conflict(_))));

        s.end_voting(&caps, Some("3"), "r1".into(), Utc::now())
            .unwrap();
        let round = &s.story("st1").unwrap().voting_history[0];
        assert!(!round.votes.contains_key("b"));
        assert!(!round.votes.values().any(|v| v == "13"));
    }

    #[test]
    fn test_stakeholder_cannot_start_but_host_can() {
        let mut s = session(Deck::Fibonacci);

        let stakeholder = Capabilities::resolve(Role::Stakeholder, false);
        let result = s.start_voting(&stakeholder, "st1");
        assert!(matches!(result, Err(AppError::Permission(_))));
        assert_eq!(s.phase(), VotingPhase::Idle);

        let host = Capabilities::resolve(Role::Stakeholder, true);
        s.start_voting(&host, "st1").unwrap();
        assert_eq!(s.phase(), VotingPhase::Voting);
    }

    #[test]
    fn test_start_preconditions() {
        let mut s = session(Deck::Fibonacci);
        let caps = Capabilities::ALL;

        assert!(matches!(
            s.start_voting(&caps, "missing"),
            Err(AppError::NotFound(_))
        ));

        s.start_voting(&caps, "st1").unwrap();
        assert!(matches!(
            s.start_voting(&caps, "st1"),
            Err(AppError::Conflict(_))
        ));

        s.reveal_votes(&caps).unwrap();
        assert!(matches!(
            s.start_voting(&caps, "st1"),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_cast_vote_validation() {
        let mut s = session(Deck::Fibonacci);
        let caps = Capabilities::ALL;

        assert!(matches!(s.cast_vote("a", "5"), Err(AppError::Conflict(_))));

        s.start_voting(&caps, "st1").unwrap();
        assert!(matches!(
            s.cast_vote("a", "4"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            s.cast_vote("ghost", "5"),
            Err(AppError::NotFound(_))
        ));

        s.cast_vote("a", "5").unwrap();
        assert_eq!(s.cast_vote("a", "5").unwrap(), Mutation::Unchanged);
        assert_eq!(s.cast_vote("a", "8").unwrap(), Mutation::Applied);
        assert_eq!(s.participant("a").unwrap().vote.as_deref(), Some("8"));
        assert!(s.participant("b").unwrap().vote.is_none());
    }

    #[test]
    fn test_reveal_is_idempotent() {
        let mut s = session(Deck::Fibonacci);
        let caps = Capabilities::ALL;

        assert!(matches!(s.reveal_votes(&caps), Err(AppError::Conflict(_))));

        s.start_voting(&caps, "st1").unwrap();
        s.cast_vote("a", "2").unwrap();
        assert_eq!(s.reveal_votes(&caps).unwrap(), Mutation::Applied);
        let once = s.clone();
        assert_eq!(s.reveal_votes(&caps).unwrap(), Mutation::Unchanged);
        assert_eq!(s, once);
    }

    #[test]
    fn test_end_directly_from_voting() {
        let mut s = session(Deck::Fibonacci);
        let caps = Capabilities::ALL;

        assert!(matches!(
            s.end_voting(&caps, None, "r0".into(), Utc::now()),
            Err(AppError::Conflict(_))
        ));

        s.start_voting(&caps, "st1").unwrap();
        s.cast_vote("a", "8").unwrap();
        s.end_voting(&caps, Some("8"), "r1".into(), Utc::now())
            .unwrap();
        assert_eq!(s.story("st1").unwrap().voting_history.len(), 1);
    }

    #[test]
    fn test_end_rejects_bad_estimates() {
        let mut s = session(Deck::Fibonacci);
        let caps = Capabilities::ALL;
        s.start_voting(&caps, "st1").unwrap();

        assert!(matches!(
            s.end_voting(&caps, Some("   "), "r1".into(), Utc::now()),
            Err(AppError::Validation(_))
        ));
        let long = "x".repeat(33);
        assert!(matches!(
            s.end_voting(&caps, Some(&long), "r1".into(), Utc::now()),
            Err(AppError::Validation(_))
        ));
        assert_eq!(s.phase(), VotingPhase::Voting);
        assert!(s.story("st1").unwrap().voting_history.is_empty());
    }

    #[test]
    fn test_vote_completeness_predicates() {
        let mut s = session(Deck::Fibonacci);
        let caps = Capabilities::ALL;
        s.start_voting(&caps, "st1").unwrap();
        s.cast_vote("host", "1").unwrap();
        s.cast_vote("a", "1").unwrap();

        s.participants[2].is_online = false;
        assert!(s.all_online_participants_voted());
        assert!(!s.all_known_participants_voted());

        s.participants.clear();
        assert!(!s.all_online_participants_voted());
        assert!(!s.all_known_participants_voted());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Start,
            Cast(usize, usize),
            Reveal,
            End(Option<usize>),
        }

        const PEOPLE: [&str; 3] = ["host", "a", "b"];

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                Just(Op::Start),
                (0..3_usize, 0..12_usize).prop_map(|(p, c)| Op::Cast(p, c)),
                Just(Op::Reveal),
                proptest::option::of(0..12_usize).prop_map(Op::End),
            ]
        }

        proptest! {
            #[test]
            fn round_invariants_hold(ops in proptest::collection::vec(op(), 0..40)) {
                let mut s = session(Deck::Fibonacci);
                let caps = Capabilities::ALL;
                let cards: Vec<String> = s.deck.cards().into_iter().map(str::to_string).collect();

                for (i, op) in ops.into_iter().enumerate() {
                    let before = s.clone();
                    let result = match op {
                        Op::Start => s.start_voting(&caps, "st1"),
                        Op::Cast(p, c) => {
                            let result = s.cast_vote(PEOPLE[p], &cards[c]);
                            if result.is_ok() {
                                prop_assert_eq!(s.participants[p].vote.as_deref(), Some(cards[c].as_str()));
                                for (j, other) in s.participants.iter().enumerate() {
                                    if j != p {
                                        prop_assert_eq!(&other.vote, &before.participants[j].vote);
                                    }
                                }
                            }
                            result
                        }
                        Op::Reveal => s.reveal_votes(&caps),
                        Op::End(c) => s.end_voting(
                            &caps,
                            c.map(|c| cards[c].as_str()),
                            format!("r{i}"),
                            Utc::now(),
                        ),
                    };

                    if result.is_err() {
                        prop_assert_eq!(&s, &before);
                    }
                    prop_assert!(s.round_is_consistent());

                    let old = &before.stories[0].voting_history;
                    let new = &s.stories[0].voting_history;
                    prop_assert!(new.len() >= old.len());
                    prop_assert_eq!(&new[..old.len()], &old[..]);
                }
            }
        }
    }
}
