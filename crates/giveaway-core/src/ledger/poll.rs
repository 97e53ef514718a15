// Prize poll: chat votes on which configured prize the next draw is for.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;

use super::prize::parse_prize;

/// Most options a single poll offers.
pub const MAX_POLL_OPTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOption {
    /// Number chat types to vote for this option.
    pub label: u8,
    pub display: String,
    /// Index of the first string with this display key in the source list.
    pub source_index: usize,
}

/// What happened to a chat message sent while a poll is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Counted { label: u8 },
    AlreadyVoted,
    NotAVote,
}

#[derive(Debug, Clone)]
pub struct PollSession {
    options: Vec<PollOption>,
    votes: HashMap<usize, u32>,
    voters: HashSet<String>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Open a poll over the distinct prize types in `source`. Returns `None` when
/// the list holds no prizes.
pub fn start_poll<R: Rng + ?Sized>(source: &[String], rng: &mut R) -> Option<PollSession> {
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for (index, text) in source.iter().enumerate() {
        let key = parse_prize(text).display_key();
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        distinct.push((index, key));
    }
    if distinct.is_empty() {
        return None;
    }

    let count = distinct.len().min(MAX_POLL_OPTIONS);
    let mut picked = distinct.into_iter().choose_multiple(rng, count);
    picked.shuffle(rng);

    let mut labels: Vec<u8> = (1..=count as u8).collect();
    labels.shuffle(rng);

    let mut options: Vec<PollOption> = picked
        .into_iter()
        .zip(labels)
        .map(|((source_index, display), label)| PollOption {
            label,
            display,
            source_index,
        })
        .collect();
    options.sort_by_key(|o| o.label);

    Some(PollSession {
        options,
        votes: HashMap::new(),
        voters: HashSet::new(),
        deadline: None,
    })
}

impl PollSession {
    /// Options ordered by label.
    pub fn options(&self) -> &[PollOption] {
        &self.options
    }

    pub fn votes_for(&self, source_index: usize) -> u32 {
        self.votes.get(&source_index).copied().unwrap_or(0)
    }

    pub fn total_votes(&self) -> u32 {
        self.votes.values().sum()
    }

    pub fn option_for(&self, source_index: usize) -> Option<&PollOption> {
        self.options.iter().find(|o| o.source_index == source_index)
    }

    /// Record a vote. Only a bare option number counts, and only the first
    /// valid vote from each voter.
    pub fn vote(&mut self, voter: &str, text: &str) -> VoteOutcome {
        let Ok(label) = text.trim().parse::<u8>() else {
            return VoteOutcome::NotAVote;
        };
        let Some(option) = self.options.iter().find(|o| o.label == label) else {
            return VoteOutcome::NotAVote;
        };
        if !self.voters.insert(voter.to_lowercase()) {
            return VoteOutcome::AlreadyVoted;
        }
        *self.votes.entry(option.source_index).or_insert(0) += 1;
        VoteOutcome::Counted { label }
    }

    /// The winning option's source index. Ties are broken uniformly at
    /// random; a poll nobody voted in has no winner.
    pub fn tally<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let best = self.votes.values().copied().max().filter(|&n| n > 0)?;
        let leaders: Vec<usize> = self
            .options
            .iter()
            .map(|o| o.source_index)
            .filter(|i| self.votes_for(*i) == best)
            .collect();
        leaders.choose(rng).copied()
    }
}
