//! CLI command handlers.

pub mod config;
pub mod outline;
pub mod slides;
