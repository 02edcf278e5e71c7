//! Session lifecycle: creation, participants, stories and deck.

use chrono::{DateTime, Duration, Utc};
use sprintdeck_common::{AppError, AppResult, IdGenerator};
use tracing::{debug, info};

use crate::access::{Actor, Capabilities, Capability};
use crate::deck::Deck;
use crate::model::{
    BacklogStatus, BacklogStory, Mutation, Participant, SessionAggregate, SessionStory,
    VotingPhase,
};

const MAX_NAME_LEN: usize = 128;
const MAX_TITLE_LEN: usize = 512;

fn validate_text(field: &str, value: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be blank")));
    }
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} is longer than {max} characters"
        )));
    }
    Ok(value.to_string())
}

impl SessionAggregate {
    /// Create a session. The host joins as the first participant.
    pub fn create(
        id: String,
        name: &str,
        host: &Actor,
        deck: Deck,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let name = validate_text("session name", name, MAX_NAME_LEN)?;
        deck.validate()?;

        Ok(Self {
            id,
            name,
            host_id: host.id.clone(),
            participants: vec![Participant {
                id: host.id.clone(),
                name: host.name.clone(),
                is_host: true,
                is_online: true,
                last_seen: now,
                vote: None,
            }],
            stories: Vec::new(),
            current_story_id: None,
            voting_in_progress: false,
            votes_revealed: false,
            deck,
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Join, or rejoin, as `actor`. Rejoining refreshes name and liveness.
    pub fn join(&mut self, actor: &Actor, now: DateTime<Utc>) -> AppResult<Mutation> {
        if !self.is_active {
            return Err(AppError::Conflict("session has ended".to_string()));
        }

        if let Some(existing) = self.participants.iter_mut().find(|p| p.id == actor.id) {
            existing.name.clone_from(&actor.name);
            existing.is_online = true;
            existing.last_seen = now;
        } else {
            self.participants.push(Participant {
                id: actor.id.clone(),
                name: actor.name.clone(),
                is_host: self.host_id == actor.id,
                is_online: true,
                last_seen: now,
                vote: None,
            });
            info!(session_id = %self.id, participant_id = %actor.id, "Participant joined");
        }
        Ok(Mutation::Applied)
    }

    /// Leave the session. The host is only marked offline.
    pub fn leave(&mut self, participant_id: &str) -> AppResult<Mutation> {
        let index = self
            .participants
            .iter()
            .position(|p| p.id == participant_id)
            .ok_or_else(|| AppError::NotFound(format!("Participant not found: {participant_id}")))?;

        if self.participants[index].is_host {
            self.participants[index].is_online = false;
        } else {
            self.participants.remove(index);
            info!(session_id = %self.id, participant_id, "Participant left");
        }
        Ok(Mutation::Applied)
    }

    /// Record a liveness ping.
    pub fn heartbeat(&mut self, participant_id: &str, now: DateTime<Utc>) -> AppResult<Mutation> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| AppError::NotFound(format!("Participant not found: {participant_id}")))?;

        participant.last_seen = now;
        participant.is_online = true;
        Ok(Mutation::Applied)
    }

    /// Mark participants not seen within `stale_after` as offline.
    ///
    /// Returns how many participants went offline.
    pub fn sweep_stale(&mut self, now: DateTime<Utc>, stale_after: Duration) -> usize {
        let mut swept = 0;
        for participant in &mut self.participants {
            if participant.is_online && now - participant.last_seen > stale_after {
                participant.is_online = false;
                swept += 1;
            }
        }
        if swept > 0 {
            debug!(session_id = %self.id, swept, "Marked stale participants offline");
        }
        swept
    }

    /// Add a story to estimate.
    pub fn add_story(
        &mut self,
        caps: &Capabilities,
        id: String,
        title: &str,
        description: &str,
    ) -> AppResult<&SessionStory> {
        caps.require(Capability::CreateStory)?;
        if !self.is_active {
            return Err(AppError::Conflict("session has ended".to_string()));
        }
        let title = validate_text("story title", title, MAX_TITLE_LEN)?;

        self.stories.push(SessionStory {
            id,
            title,
            description: description.trim().to_string(),
            estimate: None,
            is_estimated: false,
            voting_history: Vec::new(),
            original_story_id: None,
        });
        self.stories
            .last()
            .ok_or_else(|| AppError::Internal("story vanished after insert".to_string()))
    }

    /// Import backlog stories not already in the session.
    ///
    /// Only stories in `backlog` status are taken. Returns how many were
    /// added.
    pub fn import_stories(
        &mut self,
        caps: &Capabilities,
        backlog: &[BacklogStory],
        id_gen: &IdGenerator,
    ) -> AppResult<usize> {
        caps.require(Capability::CreateStory)?;
        if !self.is_active {
            return Err(AppError::Conflict("session has ended".to_string()));
        }

        let mut imported = 0;
        for source in backlog.iter().filter(|s| s.status == BacklogStatus::Backlog) {
            let already_present = self
                .stories
                .iter()
                .any(|s| s.original_story_id.as_deref() == Some(source.id.as_str()));
            if already_present {
                continue;
            }

            self.stories.push(SessionStory {
                id: id_gen.generate(),
                title: source.title.clone(),
                description: source.description.clone().unwrap_or_default(),
                estimate: None,
                is_estimated: false,
                voting_history: Vec::new(),
                original_story_id: Some(source.id.clone()),
            });
            imported += 1;
        }

        if imported > 0 {
            info!(session_id = %self.id, imported, "Imported backlog stories");
        }
        Ok(imported)
    }

    /// Remove a story that is not being voted on.
    pub fn remove_story(&mut self, caps: &Capabilities, story_id: &str) -> AppResult<Mutation> {
        caps.require(Capability::DeleteStory)?;

        let index = self
            .stories
            .iter()
            .position(|s| s.id == story_id)
            .ok_or_else(|| AppError::NotFound(format!("Story not found: {story_id}")))?;

        if self.current_story_id.as_deref() == Some(story_id) {
            return Err(AppError::Conflict(
                "story is being voted on".to_string(),
            ));
        }

        self.stories.remove(index);
        Ok(Mutation::Applied)
    }

    /// Switch decks. Host only, and only before the first recorded round:
    /// metrics read every round against the current deck.
    pub fn change_deck(&mut self, actor_id: &str, deck: Deck) -> AppResult<Mutation> {
        if !self.is_host(actor_id) {
            return Err(AppError::Permission(
                "only the host can change the deck".to_string(),
            ));
        }
        if self.phase() != VotingPhase::Idle {
            return Err(AppError::Conflict(
                "cannot change the deck during a round".to_string(),
            ));
        }
        deck.validate()?;

        if self.deck == deck {
            return Ok(Mutation::Unchanged);
        }
        if self.stories.iter().any(|s| !s.voting_history.is_empty()) {
            return Err(AppError::Conflict(
                "cannot change the deck after rounds were recorded".to_string(),
            ));
        }
        self.deck = deck;
        Ok(Mutation::Applied)
    }

    /// End the session. Any open round is dropped without being recorded.
    pub fn end(&mut self, actor_id: &str) -> AppResult<Mutation> {
        if !self.is_host(actor_id) {
            return Err(AppError::Permission(
                "only the host can end the session".to_string(),
            ));
        }
        if !self.is_active {
            return Ok(Mutation::Unchanged);
        }

        self.close_round();
        self.is_active = false;
        info!(session_id = %self.id, "Session ended");
        Ok(Mutation::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::access::Role;

    fn host() -> Actor {
        Actor::new("host", "Hana", Role::ScrumMaster)
    }

    fn new_session() -> SessionAggregate {
        SessionAggregate::create("s1".into(), "Refinement", &host(), Deck::Fibonacci, Utc::now())
            .unwrap()
    }

    fn backlog_story(id: &str, status: BacklogStatus) -> BacklogStory {
        let now = Utc::now();
        BacklogStory {
            id: id.to_string(),
            project_id: "p1".to_string(),
            epic_id: None,
            title: format!("Backlog {id}"),
            description: Some("details".to_string()),
            status,
            estimate: None,
            sprint_attempts: Vec::new(),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_create_validates() {
        let s = new_session();
        assert_eq!(s.participants.len(), 1);
        assert!(s.participants[0].is_host);

        let blank = SessionAggregate::create("s2".into(), "  ", &host(), Deck::Fibonacci, Utc::now());
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let bad_deck = SessionAggregate::create(
            "s3".into(),
            "Name",
            &host(),
            Deck::Custom(vec!["only".into()]),
            Utc::now(),
        );
        assert!(matches!(bad_deck, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut s = new_session();
        let dev = Actor::new("d1", "Dev", Role::Developer);
        s.join(&dev, Utc::now()).unwrap();
        s.join(&Actor::new("d1", "Dev Renamed", Role::Developer), Utc::now())
            .unwrap();

        assert_eq!(s.participants.len(), 2);
        assert_eq!(s.participant("d1").unwrap().name, "Dev Renamed");
        assert!(!s.participant("d1").unwrap().is_host);
    }

    #[test]
    fn test_leave() {
        let mut s = new_session();
        s.join(&Actor::new("d1", "Dev", Role::Developer), Utc::now())
            .unwrap();

        s.leave("d1").unwrap();
        assert!(s.participant("d1").is_none());

        s.leave("host").unwrap();
        assert!(!s.participant("host").unwrap().is_online);

        assert!(matches!(s.leave("nobody"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_sweep_stale() {
        let mut s = new_session();
        let start = Utc::now();
        s.join(&Actor::new("d1", "Dev", Role::Developer), start)
            .unwrap();
        s.heartbeat("host", start + Duration::seconds(80)).unwrap();

        let swept = s.sweep_stale(start + Duration::seconds(100), Duration::seconds(90));
        assert_eq!(swept, 1);
        assert!(!s.participant("d1").unwrap().is_online);
        assert!(s.participant("host").unwrap().is_online);

        s.heartbeat("d1", start + Duration::seconds(101)).unwrap();
        assert!(s.participant("d1").unwrap().is_online);
    }

    #[test]
    fn test_import_skips_duplicates_and_non_backlog() {
        let mut s = new_session();
        let caps = Capabilities::ALL;
        let id_gen = IdGenerator::new();
        let backlog = vec![
            backlog_story("b1", BacklogStatus::Backlog),
            backlog_story("b2", BacklogStatus::InSprint),
            backlog_story("b3", BacklogStatus::Backlog),
        ];

        assert_eq!(s.import_stories(&caps, &backlog, &id_gen).unwrap(), 2);
        assert_eq!(s.import_stories(&caps, &backlog, &id_gen).unwrap(), 0);
        assert_eq!(s.stories.len(), 2);
        assert_eq!(s.stories[0].original_story_id.as_deref(), Some("b1"));
        assert_eq!(s.stories[0].description, "details");

        let dev = Capabilities::for_role(Role::Developer);
        assert!(matches!(
            s.import_stories(&dev, &backlog, &id_gen),
            Err(AppError::Permission(_))
        ));
    }

    #[test]
    fn test_remove_story_during_round() {
        let mut s = new_session();
        let caps = Capabilities::ALL;
        s.add_story(&caps, "st1".into(), "Login", "").unwrap();
        s.add_story(&caps, "st2".into(), "Logout", "").unwrap();
        s.start_voting(&caps, "st1").unwrap();

        assert!(matches!(
            s.remove_story(&caps, "st1"),
            Err(AppError::Conflict(_))
        ));
        s.remove_story(&caps, "st2").unwrap();
        assert_eq!(s.stories.len(), 1);

        let sm = Capabilities::for_role(Role::ScrumMaster);
        assert!(matches!(
            s.remove_story(&sm, "st1"),
            Err(AppError::Permission(_))
        ));
    }

    #[test]
    fn test_change_deck_rules() {
        let mut s = new_session();
        let caps = Capabilities::ALL;
        assert!(matches!(
            s.change_deck("someone", Deck::TShirt),
            Err(AppError::Permission(_))
        ));

        assert_eq!(s.change_deck("host", Deck::TShirt).unwrap(), Mutation::Applied);
        assert_eq!(
            s.change_deck("host", Deck::TShirt).unwrap(),
            Mutation::Unchanged
        );

        s.add_story(&caps, "st1".into(), "Login", "").unwrap();
        s.start_voting(&caps, "st1").unwrap();
        assert!(matches!(
            s.change_deck("host", Deck::Fibonacci),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_deck_is_fixed_once_rounds_are_recorded() {
        let mut s = new_session();
        let caps = Capabilities::ALL;
        s.add_story(&caps, "st1".into(), "Login", "").unwrap();
        s.start_voting(&caps, "st1").unwrap();
        s.cast_vote("host", "3").unwrap();
        s.end_voting(&caps, Some("3"), "r1".into(), Utc::now()).unwrap();
        assert!(!s.story("st1").unwrap().voting_history.is_empty());

        assert!(matches!(
            s.change_deck("host", Deck::TShirt),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(s.deck, Deck::Fibonacci);
    }

    #[test]
    fn test_end_session_drops_open_round() {
        let mut s = new_session();
        let caps = Capabilities::ALL;
        s.add_story(&caps, "st1".into(), "Login", "").unwrap();
        s.start_voting(&caps, "st1").unwrap();
        s.cast_vote("host", "3").unwrap();

        s.end("host").unwrap();
        assert!(!s.is_active);
        assert_eq!(s.phase(), VotingPhase::Idle);
        assert!(s.story("st1").unwrap().voting_history.is_empty());
        assert!(s.round_is_consistent());

        assert_eq!(s.end("host").unwrap(), Mutation::Unchanged);
        assert!(matches!(
            s.join(&Actor::new("late", "Late", Role::Developer), Utc::now()),
            Err(AppError::Conflict(_))
        ));
    }
}
