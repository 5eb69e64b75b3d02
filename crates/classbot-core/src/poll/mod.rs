//! Live multi-question polls.
//!
//! A [`Poll`] owns its questions, the current-question pointer and one
//! [`VoteLedger`] per question. Question navigation clamps at both ends;
//! it never wraps.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::UserId;
use crate::error::{EngineError, EngineResult};
use crate::symbols::option_index;

mod manager;
mod parser;

pub use manager::{PollManager, QuestionView, ReactionOutcome, TallyView, correct_answer};
pub use parser::parse_questions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub prompt: String,
    /// Option texts in label order (A, B, ...). At most four.
    pub options: Vec<String>,
    pub correct: char,
}

impl Question {
    pub fn correct_index(&self) -> Option<usize> {
        option_index(self.correct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Voter → most recent option for one question.
#[derive(Debug, Clone, Default)]
pub struct VoteLedger {
    votes: HashMap<UserId, usize>,
}

impl VoteLedger {
    /// Records `voter`'s choice, returning the option it replaced.
    pub fn record(&mut self, voter: UserId, option: usize) -> Option<usize> {
        self.votes.insert(voter, option)
    }

    pub fn vote_of(&self, voter: UserId) -> Option<usize> {
        self.votes.get(&voter).copied()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn tally(&self, option_count: usize) -> Tally {
        let mut counts = vec![0; option_count];
        for option in self.votes.values() {
            if let Some(count) = counts.get_mut(*option) {
                *count += 1;
            }
        }
        Tally {
            counts,
            total_voters: self.votes.len(),
        }
    }
}

/// Vote counts per option for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub counts: Vec<usize>,
    pub total_voters: usize,
}

impl Tally {
    pub fn count(&self, option: usize) -> usize {
        self.counts.get(option).copied().unwrap_or(0)
    }

    /// Rounded share of voters who chose `option`; 0 when nobody voted.
    pub fn percentage(&self, option: usize) -> u32 {
        if self.total_voters == 0 {
            return 0;
        }
        let share = self.count(option) as f64 / self.total_voters as f64;
        (share * 100.0).round() as u32
    }

    pub fn percentages(&self) -> Vec<u32> {
        (0..self.counts.len())
            .map(|option| self.percentage(option))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReceipt {
    pub question: usize,
    pub option: usize,
    /// Option the voter had chosen before, if this overwrote a vote.
    pub replaced: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Poll {
    name: String,
    questions: Vec<Question>,
    current: usize,
    ledgers: Vec<VoteLedger>,
    closes_at: Option<Instant>,
}

impl Poll {
    /// Opens a poll on its first question. `window` bounds how long
    /// reactions are accepted; `None` keeps the poll open until ended.
    pub fn open(
        name: impl Into<String>,
        questions: Vec<Question>,
        window: Option<Duration>,
        now: Instant,
    ) -> EngineResult<Self> {
        if questions.is_empty() {
            return Err(EngineError::EmptyPoll);
        }
        let ledgers = vec![VoteLedger::default(); questions.len()];
        Ok(Self {
            name: name.into(),
            questions,
            current: 0,
            ledgers,
            closes_at: window.map(|window| now + window),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.current]
    }

    pub fn is_closed(&self, now: Instant) -> bool {
        self.closes_at.is_some_and(|closes_at| now >= closes_at)
    }

    /// Moves the question pointer one step, staying put at either end.
    /// Returns whether the pointer moved.
    pub fn advance(&mut self, direction: Direction, now: Instant) -> EngineResult<bool> {
        self.ensure_open(now)?;
        let target = match direction {
            Direction::Forward if self.current + 1 < self.questions.len() => self.current + 1,
            Direction::Backward if self.current > 0 => self.current - 1,
            _ => return Ok(false),
        };
        self.current = target;
        Ok(true)
    }

    /// Records a vote on the question currently displayed.
    pub fn cast_vote(
        &mut self,
        voter: UserId,
        option: usize,
        now: Instant,
    ) -> EngineResult<VoteReceipt> {
        self.cast_vote_at(self.current, voter, option, now)
    }

    /// Records a vote on an explicit question.
    pub fn cast_vote_at(
        &mut self,
        question: usize,
        voter: UserId,
        option: usize,
        now: Instant,
    ) -> EngineResult<VoteReceipt> {
        self.ensure_open(now)?;
        let available = self
            .questions
            .get(question)
            .ok_or_else(|| EngineError::NotFound(format!("question {}", question + 1)))?
            .options
            .len();
        if option >= available {
            return Err(EngineError::InvalidOption {
                index: option,
                available,
            });
        }
        let replaced = self.ledgers[question].record(voter, option);
        Ok(VoteReceipt {
            question,
            option,
            replaced,
        })
    }

    pub fn tally(&self, question: usize) -> EngineResult<Tally> {
        let entry = self
            .questions
            .get(question)
            .ok_or_else(|| EngineError::NotFound(format!("question {}", question + 1)))?;
        Ok(self.ledgers[question].tally(entry.options.len()))
    }

    pub fn ledger(&self, question: usize) -> Option<&VoteLedger> {
        self.ledgers.get(question)
    }

    fn ensure_open(&self, now: Instant) -> EngineResult<()> {
        if self.is_closed(now) {
            return Err(EngineError::PollClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn question(prompt: &str, options: usize) -> Question {
        Question {
            prompt: prompt.to_string(),
            options: (0..options).map(|i| format!("option {i}")).collect(),
            correct: 'A',
        }
    }

    fn two_question_poll(now: Instant) -> Poll {
        Poll::open("quiz", vec![question("Q1", 4), question("Q2", 3)], None, now).unwrap()
    }

    #[test]
    fn open_rejects_empty_question_list() {
        let err = Poll::open("empty", Vec::new(), None, Instant::now()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyPoll));
    }

    #[test]
    fn advance_clamps_at_both_ends() {
        let now = Instant::now();
        let mut poll = two_question_poll(now);

        assert!(!poll.advance(Direction::Backward, now).unwrap());
        assert_eq!(poll.current_index(), 0);

        assert!(poll.advance(Direction::Forward, now).unwrap());
        assert_eq!(poll.current_index(), 1);

        assert!(!poll.advance(Direction::Forward, now).unwrap());
        assert_eq!(poll.current_index(), 1);
    }

    #[test]
    fn revote_overwrites_previous_choice() {
        let now = Instant::now();
        let mut poll = two_question_poll(now);

        let first = poll.cast_vote(42, 0, now).unwrap();
        assert_eq!(first.replaced, None);
        let second = poll.cast_vote(42, 2, now).unwrap();
        assert_eq!(second.replaced, Some(0));

        let ledger = poll.ledger(0).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.vote_of(42), Some(2));
    }

    #[test]
    fn two_voters_tally_per_option() {
        let now = Instant::now();
        let mut poll = two_question_poll(now);
        poll.cast_vote(1, 0, now).unwrap();
        poll.cast_vote(2, 1, now).unwrap();

        let tally = poll.tally(0).unwrap();
        assert_eq!(tally.counts, vec![1, 1, 0, 0]);
        assert_eq!(tally.total_voters, 2);
        assert_eq!(tally.percentages(), vec![50, 50, 0, 0]);
        assert_eq!(poll.tally(1).unwrap().counts, vec![0, 0, 0]);
    }

    #[test]
    fn votes_follow_the_displayed_question() {
        let now = Instant::now();
        let mut poll = two_question_poll(now);
        poll.advance(Direction::Forward, now).unwrap();
        let receipt = poll.cast_vote(5, 2, now).unwrap();
        assert_eq!(receipt.question, 1);
        assert!(poll.ledger(0).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_option_leaves_ledger_untouched() {
        let now = Instant::now();
        let mut poll = two_question_poll(now);
        poll.advance(Direction::Forward, now).unwrap();

        let err = poll.cast_vote(5, 3, now).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidOption {
                index: 3,
                available: 3
            }
        ));
        assert!(poll.ledger(1).unwrap().is_empty());
    }

    #[test]
    fn explicit_question_binding_targets_that_ledger() {
        let now = Instant::now();
        let mut poll = two_question_poll(now);
        poll.cast_vote_at(1, 9, 0, now).unwrap();
        assert_eq!(poll.current_index(), 0);
        assert_eq!(poll.ledger(1).unwrap().vote_of(9), Some(0));
        assert!(poll.cast_vote_at(2, 9, 0, now).is_err());
    }

    #[test]
    fn closed_poll_rejects_votes_and_navigation() {
        let opened = Instant::now();
        let mut poll = Poll::open(
            "timed",
            vec![question("Q1", 2), question("Q2", 2)],
            Some(Duration::from_secs(60)),
            opened,
        )
        .unwrap();
        poll.cast_vote(1, 1, opened).unwrap();

        let later = opened + Duration::from_secs(61);
        assert!(matches!(
            poll.cast_vote(2, 0, later),
            Err(EngineError::PollClosed)
        ));
        assert!(matches!(
            poll.advance(Direction::Forward, later),
            Err(EngineError::PollClosed)
        ));
        assert_eq!(poll.current_index(), 0);
        // Results stay readable after closing.
        assert_eq!(poll.tally(0).unwrap().counts, vec![0, 1]);
    }

    #[test]
    fn empty_ledger_tallies_to_zero_percent() {
        let tally = VoteLedger::default().tally(4);
        assert_eq!(tally.total_voters, 0);
        assert_eq!(tally.percentages(), vec![0, 0, 0, 0]);
    }

    proptest! {
        #[test]
        fn percentages_sum_to_about_one_hundred(
            votes in proptest::collection::vec((0i64..200, 0usize..4), 1..300)
        ) {
            let mut ledger = VoteLedger::default();
            for (voter, option) in votes {
                ledger.record(voter, option);
            }
            let tally = ledger.tally(4);
            prop_assert_eq!(tally.counts.iter().sum::<usize>(), tally.total_voters);
            let total: u32 = tally.percentages().iter().sum();
            prop_assert!((98..=102).contains(&total), "percentages summed to {}", total);
        }

        #[test]
        fn pointer_stays_in_bounds(
            count in 1usize..6,
            steps in proptest::collection::vec(any::<bool>(), 0..40)
        ) {
            let now = Instant::now();
            let questions = (0..count).map(|i| question(&format!("Q{i}"), 4)).collect();
            let mut poll = Poll::open("p", questions, None, now).unwrap();
            for forward in steps {
                let direction = if forward { Direction::Forward } else { Direction::Backward };
                poll.advance(direction, now).unwrap();
                prop_assert!(poll.current_index() < count);
            }
        }
    }
}
