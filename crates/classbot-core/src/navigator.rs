//! Per-user slide navigation.
//!
//! A session is either absent (idle) or holds a non-empty deck and a
//! cursor. `next`/`previous` wrap around the deck in both directions.

use std::sync::Arc;

use crate::deck::{Deck, DeckSource};
use crate::error::{EngineError, EngineResult};
use crate::session_store::{MemorySessionStore, SessionStore};
use crate::{SlideRef, UserId};

#[derive(Debug, Clone)]
pub struct PresentationSession {
    deck: Arc<[SlideRef]>,
    source: DeckSource,
    cursor: usize,
}

impl PresentationSession {
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.deck.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deck.is_empty()
    }

    pub fn source(&self) -> &DeckSource {
        &self.source
    }

    pub fn slides(&self) -> &[SlideRef] {
        &self.deck
    }

    fn view(&self) -> SlideView {
        SlideView {
            slide: self.deck[self.cursor].clone(),
            index: self.cursor,
            total: self.deck.len(),
        }
    }
}

/// The slide under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideView {
    pub slide: SlideRef,
    pub index: usize,
    pub total: usize,
}

pub struct Navigator<S = MemorySessionStore<UserId, PresentationSession>> {
    sessions: S,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self::with_store(MemorySessionStore::new())
    }
}

impl<S> Navigator<S>
where
    S: SessionStore<UserId, PresentationSession>,
{
    pub fn with_store(sessions: S) -> Self {
        Self { sessions }
    }

    /// Starts (or restarts) a session on `deck` at its first slide.
    pub fn start(&self, user: UserId, deck: Deck) -> EngineResult<SlideView> {
        if deck.slides.is_empty() {
            return Err(EngineError::EmptyDeck);
        }
        let session = PresentationSession {
            deck: deck.slides.into(),
            source: deck.source,
            cursor: 0,
        };
        let view = session.view();
        self.sessions.put(user, session);
        Ok(view)
    }

    pub fn next(&self, user: UserId) -> EngineResult<SlideView> {
        self.step(user, |cursor, len| (cursor + 1) % len)
    }

    pub fn previous(&self, user: UserId) -> EngineResult<SlideView> {
        self.step(user, |cursor, len| (cursor + len - 1) % len)
    }

    pub fn current(&self, user: UserId) -> EngineResult<SlideView> {
        self.sessions
            .update(&user, |session| session.view())
            .ok_or(EngineError::NoActiveSession)
    }

    pub fn session(&self, user: UserId) -> Option<PresentationSession> {
        self.sessions.get(&user)
    }

    pub fn end(&self, user: UserId) -> EngineResult<PresentationSession> {
        self.sessions
            .delete(&user)
            .ok_or(EngineError::NoActiveSession)
    }

    fn step(
        &self,
        user: UserId,
        move_cursor: fn(usize, usize) -> usize,
    ) -> EngineResult<SlideView> {
        self.sessions
            .update(&user, |session| {
                session.cursor = move_cursor(session.cursor, session.deck.len());
                session.view()
            })
            .ok_or(EngineError::NoActiveSession)
    }
}
