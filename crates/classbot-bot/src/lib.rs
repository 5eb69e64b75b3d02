//! Telegram gateway: long-polls updates, serializes them per session owner
//! and turns engine state into slide uploads and poll messages.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use classbot_core::Engine;
use classbot_core::config::{Config, paths};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bot::{BotContext, Inbound, dispatch, new_user_queues};
use crate::commands::telegram_command_specs;
use crate::telegram::{TelegramClient, TelegramSettings};

mod bot;
mod commands;
mod handlers;
mod reactions;
mod replies;
mod telegram;

const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the bot until Ctrl+C.
pub async fn run(config: Config) -> Result<()> {
    let settings = TelegramSettings::from_config(&config)?;
    let config_path = paths::config_path();
    if config_path.exists() {
        info!("config file: {}", config_path.display());
    }
    let engine = Engine::open(&config)?;
    info!(
        users = ?config.telegram.allowlist_user_ids,
        chats = ?config.telegram.allowlist_chat_ids,
        database = %config.database_path().display(),
        "engine ready"
    );
    run_bot(engine, settings).await
}

async fn run_bot(engine: Engine, settings: TelegramSettings) -> Result<()> {
    let client = TelegramClient::new(settings.bot_token);
    if let Err(err) = client.set_my_commands(&telegram_command_specs()).await {
        warn!("failed to register bot commands: {err:#}");
    }

    let context = Arc::new(BotContext::new(
        client.clone(),
        engine,
        settings.allowlist_user_ids,
        settings.allowlist_chat_ids,
    ));
    let queues = new_user_queues();
    let shutdown = CancellationToken::new();

    let mut offset: Option<i64> = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("classbot started, polling for updates");

    loop {
        let current_offset = offset;
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutting down Telegram bot");
                shutdown.cancel();
                break;
            }
            updates = client.get_updates(current_offset, POLL_TIMEOUT) => {
                let updates = match updates {
                    Ok(updates) => updates,
                    Err(err) => {
                        warn!("Telegram polling error: {err:#}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                if !updates.is_empty() {
                    tracing::debug!(count = updates.len(), "received updates");
                }
                for update in updates {
                    offset = Some(update.update_id + 1);
                    let inbound = match (update.message, update.callback_query) {
                        (Some(message), _) => Inbound::Message(message),
                        (None, Some(query)) => Inbound::Callback(query),
                        (None, None) => continue,
                    };
                    dispatch(&queues, &context, &shutdown, inbound).await;
                }
            }
        }
    }

    Ok(())
}
