//! Consensus and participation metrics for a planning session.
//!
//! Everything here is derived from stored voting history; nothing depends
//! on live votes or on the wall clock except the explicit `now`.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::deck::{Deck, UNKNOWN_CARD};
use crate::model::{Participant, SessionAggregate, SessionStory, VotingRound, percentage, round1};

/// Numeric spread above which a round counts as high variance.
pub const HIGH_VARIANCE_SPREAD: f64 = 5.0;

/// Average of recorded estimates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AverageEstimate {
    /// Arithmetic mean, for numeric decks.
    Numeric(f64),
    /// Most frequent estimate, for the other decks.
    Mode(String),
}

/// Summary statistics of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub total_stories: usize,
    pub estimated_stories: usize,
    /// Stories with at least one recorded round.
    pub voted_stories: usize,
    pub total_rounds: usize,
    /// Stories settled in their first round, as a percentage of voted stories.
    pub consensus_rate: f64,
    /// Stories that needed more than one round, as a percentage of voted stories.
    pub re_voting_rate: f64,
    /// Non-host votes cast over non-host votes possible.
    pub participation_rate: f64,
    pub average_estimate: Option<AverageEstimate>,
    /// Stories whose latest round disagreed strongly.
    pub high_variance_story_ids: Vec<String>,
    pub duration_minutes: i64,
}

/// Compute session metrics.
///
/// Hosts are the participants flagged `is_host` plus `host_id`; their votes
/// are left out of the participation rate.
#[must_use]
pub fn calculate_session_metrics(
    stories: &[SessionStory],
    participants: &[Participant],
    host_id: &str,
    deck: &Deck,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> SessionMetrics {
    let voted: Vec<&SessionStory> = stories
        .iter()
        .filter(|s| !s.voting_history.is_empty())
        .collect();
    let single_round = voted.iter().filter(|s| s.voting_history.len() == 1).count();
    let multi_round = voted.len() - single_round;
    let total_rounds: usize = stories.iter().map(|s| s.voting_history.len()).sum();

    let host_ids: HashSet<&str> = participants
        .iter()
        .filter(|p| p.is_host)
        .map(|p| p.id.as_str())
        .chain(std::iter::once(host_id))
        .collect();
    let non_host_participants = participants
        .iter()
        .filter(|p| !host_ids.contains(p.id.as_str()))
        .count();
    let non_host_votes: usize = stories
        .iter()
        .flat_map(|s| &s.voting_history)
        .map(|r| {
            r.votes
                .keys()
                .filter(|id| !host_ids.contains(id.as_str()))
                .count()
        })
        .sum();

    let high_variance_story_ids = stories
        .iter()
        .filter(|s| s.latest_round().is_some_and(|r| is_high_variance(r, deck)))
        .map(|s| s.id.clone())
        .collect();

    SessionMetrics {
        total_stories: stories.len(),
        estimated_stories: stories.iter().filter(|s| s.is_estimated).count(),
        voted_stories: voted.len(),
        total_rounds,
        consensus_rate: percentage(single_round, voted.len()),
        re_voting_rate: percentage(multi_round, voted.len()),
        participation_rate: percentage(non_host_votes, non_host_participants * total_rounds)
            .min(100.0),
        average_estimate: average_estimate(stories, deck),
        high_variance_story_ids,
        duration_minutes: (now - started_at).num_minutes().max(0),
    }
}

/// Whether a round's votes disagree enough to flag.
///
/// Numeric decks: spread of numeric votes above [`HIGH_VARIANCE_SPREAD`],
/// needing at least two numeric votes. Other decks: any two distinct cards.
/// `?` never counts.
#[must_use]
pub fn is_high_variance(round: &VotingRound, deck: &Deck) -> bool {
    let cards = round.votes.values().filter(|v| v.as_str() != UNKNOWN_CARD);

    if deck.is_numeric() {
        let numbers: Vec<f64> = cards.filter_map(|v| v.trim().parse::<f64>().ok()).collect();
        if numbers.len() < 2 {
            return false;
        }
        let max = numbers.iter().copied().fold(f64::MIN, f64::max);
        let min = numbers.iter().copied().fold(f64::MAX, f64::min);
        max - min > HIGH_VARIANCE_SPREAD
    } else {
        cards.collect::<BTreeSet<_>>().len() > 1
    }
}

fn average_estimate(stories: &[SessionStory], deck: &Deck) -> Option<AverageEstimate> {
    let estimates = stories
        .iter()
        .filter(|s| s.is_estimated)
        .filter_map(|s| s.estimate.as_deref());

    if deck.is_numeric() {
        let numbers: Vec<f64> = estimates.filter_map(|e| e.trim().parse::<f64>().ok()).collect();
        if numbers.is_empty() {
            return None;
        }
        let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
        Some(AverageEstimate::Numeric(round1(mean)))
    } else {
        // Counts in first-seen order so ties go to the earliest story.
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for estimate in estimates {
            match counts.iter_mut().find(|(e, _)| *e == estimate) {
                Some((_, n)) => *n += 1,
                None => counts.push((estimate, 1)),
            }
        }
        let best = counts.iter().map(|(_, n)| *n).max()?;
        counts
            .into_iter()
            .find(|(_, n)| *n == best)
            .map(|(e, _)| AverageEstimate::Mode(e.to_string()))
    }
}

impl SessionAggregate {
    /// Metrics of this session as of `now`.
    #[must_use]
    pub fn metrics(&self, now: DateTime<Utc>) -> SessionMetrics {
        calculate_session_metrics(
            &self.stories,
            &self.participants,
            &self.host_id,
            &self.deck,
            self.created_at,
            now,
        )
    }
}
