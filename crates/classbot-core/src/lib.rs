//! Core classbot library (presentation and poll engine, storage,
//! generation, rendering, config).

use std::fmt;
use std::path::{Path, PathBuf};

pub mod config;
pub mod coursework;
pub mod deck;
pub mod engine;
pub mod error;
pub mod generation;
pub mod logging;
pub mod navigator;
pub mod outline;
pub mod poll;
pub mod render;
pub mod session_store;
pub mod storage;
pub mod symbols;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};

/// Chat user id; also identifies session and poll owners.
pub type UserId = i64;

/// Handle to a rendered slide image (a file path).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlideRef(String);

impl SlideRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl From<PathBuf> for SlideRef {
    fn from(path: PathBuf) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for SlideRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
