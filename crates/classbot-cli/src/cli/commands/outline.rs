//! Outline command handlers.

use anyhow::{Result, bail};
use classbot_core::config::Config;
use classbot_core::storage::Storage;

use super::slides::open_storage;

pub async fn show(config: &Config) -> Result<()> {
    let storage = open_storage(config)?;
    let Some(outline) = storage.latest_outline().await? else {
        bail!("No saved outline yet. Generate one with /outline and keep it with /save.");
    };
    println!("# {}", outline.name);
    if let Some(source) = outline.source.as_deref() {
        println!("Source: {source}");
    }
    println!();
    println!("{}", outline.text.trim_end());
    Ok(())
}
