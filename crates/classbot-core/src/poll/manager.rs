use std::time::{Duration, Instant};

use super::{Direction, Poll, Question, Tally, VoteReceipt};
use crate::UserId;
use crate::error::{EngineError, EngineResult};
use crate::session_store::{MemorySessionStore, SessionStore};
use crate::symbols::{Reaction, option_index};

/// Question as shown to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub index: usize,
    pub total: usize,
    pub prompt: String,
    pub options: Vec<String>,
}

impl QuestionView {
    fn of(poll: &Poll) -> Self {
        let question = poll.current_question();
        Self {
            index: poll.current_index(),
            total: poll.questions().len(),
            prompt: question.prompt.clone(),
            options: question.options.clone(),
        }
    }
}

/// Results for one question, with the answer key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyView {
    pub index: usize,
    pub prompt: String,
    pub options: Vec<String>,
    pub tally: Tally,
    pub correct: char,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// A navigation symbol was applied; `moved` is false at either end.
    Navigated { view: QuestionView, moved: bool },
    Voted(VoteReceipt),
}

/// Runs at most one poll per owner.
pub struct PollManager<S = MemorySessionStore<UserId, Poll>> {
    sessions: S,
    window: Option<Duration>,
}

impl PollManager {
    pub fn new(window: Option<Duration>) -> Self {
        Self::with_store(MemorySessionStore::new(), window)
    }
}

impl<S> PollManager<S>
where
    S: SessionStore<UserId, Poll>,
{
    pub fn with_store(sessions: S, window: Option<Duration>) -> Self {
        Self { sessions, window }
    }

    /// Opens a poll for `owner`, replacing any poll already running.
    pub fn start_poll(
        &self,
        owner: UserId,
        name: &str,
        questions: Vec<Question>,
    ) -> EngineResult<QuestionView> {
        let poll = Poll::open(name, questions, self.window, Instant::now())?;
        let view = QuestionView::of(&poll);
        if self.sessions.put(owner, poll).is_some() {
            tracing::debug!(owner, "replaced running poll");
        }
        Ok(view)
    }

    pub fn advance(&self, owner: UserId, direction: Direction) -> EngineResult<ReactionOutcome> {
        self.with_poll(owner, |poll| {
            let moved = poll.advance(direction, Instant::now())?;
            Ok(ReactionOutcome::Navigated {
                view: QuestionView::of(poll),
                moved,
            })
        })
    }

    /// Records `voter`'s choice on the question currently displayed.
    pub fn cast_vote(
        &self,
        owner: UserId,
        voter: UserId,
        option: usize,
    ) -> EngineResult<VoteReceipt> {
        self.with_poll(owner, |poll| poll.cast_vote(voter, option, Instant::now()))
    }

    /// Routes a reaction symbol to navigation or voting.
    pub fn react(
        &self,
        owner: UserId,
        voter: UserId,
        reaction: Reaction,
    ) -> EngineResult<ReactionOutcome> {
        match reaction {
            Reaction::Forward => self.advance(owner, Direction::Forward),
            Reaction::Backward => self.advance(owner, Direction::Backward),
            Reaction::Option(option) => self
                .cast_vote(owner, voter, option)
                .map(ReactionOutcome::Voted),
        }
    }

    pub fn current(&self, owner: UserId) -> EngineResult<QuestionView> {
        self.with_poll(owner, |poll| Ok(QuestionView::of(poll)))
    }

    pub fn tally(&self, owner: UserId, question: usize) -> EngineResult<TallyView> {
        self.with_poll(owner, |poll| {
            let tally = poll.tally(question)?;
            let entry = &poll.questions()[question];
            Ok(TallyView {
                index: question,
                prompt: entry.prompt.clone(),
                options: entry.options.clone(),
                tally,
                correct: entry.correct,
            })
        })
    }

    /// Tallies every question in order.
    pub fn tally_all(&self, owner: UserId) -> EngineResult<Vec<TallyView>> {
        let total = self.with_poll(owner, |poll| Ok(poll.questions().len()))?;
        (0..total).map(|index| self.tally(owner, index)).collect()
    }

    /// Discards the poll and its ledgers.
    pub fn end_poll(&self, owner: UserId) -> EngineResult<Poll> {
        self.sessions
            .delete(&owner)
            .ok_or(EngineError::NoActiveSession)
    }

    pub fn is_running(&self, owner: UserId) -> bool {
        self.sessions.contains(&owner)
    }

    fn with_poll<R>(
        &self,
        owner: UserId,
        f: impl FnOnce(&mut Poll) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.sessions
            .update(&owner, f)
            .ok_or(EngineError::NoActiveSession)?
    }
}

/// Label of the correct option, e.g. `"B) Mitochondrion"`.
pub fn correct_answer(view: &TallyView) -> String {
    let text = option_index(view.correct)
        .and_then(|index| view.options.get(index))
        .map_or("", String::as_str);
    format!("{}) {text}", view.correct)
}
