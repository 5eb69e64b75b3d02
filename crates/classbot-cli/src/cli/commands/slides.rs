//! Saved slide folder inspection.

use anyhow::{Context, Result, bail};
use classbot_core::config::Config;
use classbot_core::storage::{SqliteStorage, Storage};

pub async fn folders(config: &Config, owner: i64) -> Result<()> {
    let storage = open_storage(config)?;
    let folders = storage.list_folders(owner).await?;
    if folders.is_empty() {
        println!("No saved folders for user {owner}.");
        return Ok(());
    }
    for folder in folders {
        println!(
            "{}\t{} slide(s)\t{}",
            folder.name,
            folder.slide_count,
            folder.saved_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub async fn list(config: &Config, owner: i64, folder: &str) -> Result<()> {
    let storage = open_storage(config)?;
    let slides = storage.list_slides(owner, folder.to_string()).await?;
    if slides.is_empty() {
        bail!("folder \"{folder}\" not found for user {owner}");
    }
    for (ordinal, slide) in slides.iter().enumerate() {
        println!("{}\t{slide}", ordinal + 1);
    }
    Ok(())
}

pub(super) fn open_storage(config: &Config) -> Result<SqliteStorage> {
    let path = config.database_path();
    SqliteStorage::open(&path).with_context(|| format!("open database at {}", path.display()))
}
