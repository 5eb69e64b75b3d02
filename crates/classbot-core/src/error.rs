//! Error taxonomy for the presentation and poll engine.
//!
//! Every variant is recoverable at the command boundary: callers turn it
//! into a reply with [`EngineError::user_message`] and keep running.
//! Collaborator failures (storage, generation, rendering) are wrapped with
//! their original `anyhow` chain as the source.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// LIVE deck requested but no outline has been generated or saved.
    #[error("no outline available")]
    NoOutline,

    /// Unknown or empty folder, question, or other named resource.
    #[error("{0} not found")]
    NotFound(String),

    /// A presentation cannot start on a deck without slides.
    #[error("deck has no slides")]
    EmptyDeck,

    /// A poll cannot start without questions.
    #[error("poll has no questions")]
    EmptyPoll,

    /// Navigation or voting without a running session for the key.
    #[error("no active session")]
    NoActiveSession,

    #[error("option {index} is out of range (question has {available} options)")]
    InvalidOption { index: usize, available: usize },

    /// The poll's reaction window has elapsed.
    #[error("poll is closed")]
    PollClosed,

    #[error("generation timed out after {}s", .0.as_secs())]
    GenerationTimeout(Duration),

    #[error("malformed poll text at line {line}: {reason}")]
    MalformedPollText { line: usize, reason: String },

    #[error("storage failure")]
    Storage(#[source] anyhow::Error),

    #[error("generation failure")]
    Generation(#[source] anyhow::Error),

    #[error("slide rendering failure")]
    Render(#[source] anyhow::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedPollText {
            line,
            reason: reason.into(),
        }
    }

    /// Returns the reply shown to the chat user for this error.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::NoOutline => {
                "No outline available. Generate one with /outline first.".to_string()
            }
            EngineError::NotFound(what) => format!("Not found: {what}."),
            EngineError::EmptyDeck => "There are no slides to present.".to_string(),
            EngineError::EmptyPoll => "The poll has no questions.".to_string(),
            EngineError::NoActiveSession => {
                "Nothing is running. Start a presentation with /present or a poll with /poll."
                    .to_string()
            }
            EngineError::InvalidOption { available, .. } => {
                format!("That option doesn't exist. Pick one of the first {available} options.")
            }
            EngineError::PollClosed => "This poll is closed.".to_string(),
            EngineError::GenerationTimeout(limit) => format!(
                "The language model didn't answer within {}s. Try again.",
                limit.as_secs()
            ),
            EngineError::MalformedPollText { line, reason } => format!(
                "The generated poll couldn't be read (line {line}: {reason}). Try /poll again."
            ),
            EngineError::Storage(err) => format!("Storage error: {err:#}"),
            EngineError::Generation(err) => format!("Generation failed: {err:#}"),
            EngineError::Render(err) => format!("Slide rendering failed: {err:#}"),
        }
    }
}
