//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LoggingConfig, paths};

const LOG_FILE_PREFIX: &str = "classbot.log";

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `[logging].filter`. With
/// `[logging].directory` set, output goes to a daily-rolling file and the
/// returned guard must be held until shutdown to flush it.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), &config.filter);

    if let Some(directory) = &config.directory {
        let directory = paths::resolve(directory);
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
        let appender = tracing_appender::rolling::daily(&directory, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .try_init()
            .context("failed to install tracing subscriber")?;
        return Ok(Some(guard));
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(None)
}

fn build_filter(env: Option<&str>, configured: &str) -> EnvFilter {
    env.filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
