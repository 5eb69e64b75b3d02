//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use classbot_core::{config, logging};

mod commands;

#[derive(Parser)]
#[command(name = "classbot")]
#[command(version)]
#[command(about = "Classroom assistant: lecture outlines, slide decks and live polls")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the Telegram bot (long-polling) until Ctrl+C
    Bot,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Inspect saved slide folders
    Slides {
        #[command(subcommand)]
        command: SlidesCommands,
    },
    /// Inspect saved outlines
    Outline {
        #[command(subcommand)]
        command: OutlineCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

#[derive(clap::Subcommand)]
enum SlidesCommands {
    /// List a user's saved folders
    Folders {
        /// Telegram user ID that saved the slides
        #[arg(long, env = "CLASSBOT_OWNER")]
        owner: i64,
    },
    /// List the slides of one folder in order
    List {
        /// Telegram user ID that saved the slides
        #[arg(long, env = "CLASSBOT_OWNER")]
        owner: i64,
        /// Folder name
        #[arg(long)]
        folder: String,
    },
}

#[derive(clap::Subcommand)]
enum OutlineCommands {
    /// Print the most recently saved outline
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Bot => {
            let config = load_config()?;
            let _log_guard = logging::init(&config.logging)?;
            classbot_bot::run(config).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
        Commands::Slides { command } => {
            let config = load_config()?;
            let _log_guard = logging::init(&config.logging)?;
            match command {
                SlidesCommands::Folders { owner } => {
                    commands::slides::folders(&config, owner).await
                }
                SlidesCommands::List { owner, folder } => {
                    commands::slides::list(&config, owner, &folder).await
                }
            }
        }
        Commands::Outline { command } => {
            let config = load_config()?;
            let _log_guard = logging::init(&config.logging)?;
            match command {
                OutlineCommands::Show => commands::outline::show(&config).await,
            }
        }
    }
}

fn load_config() -> Result<config::Config> {
    config::Config::load().context("load config")
}
