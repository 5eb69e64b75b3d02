//! Configuration management for classbot.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::generation::ChatCompletionsConfig;

/// Telegram bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token for Telegram API.
    pub bot_token: Option<String>,
    /// Allowlist of numeric Telegram user IDs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowlist_user_ids: Vec<i64>,
    /// Allowlist of numeric Telegram chat IDs (for groups/supergroups).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowlist_chat_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub outline_minutes: u32,
    pub poll_count: u32,
    pub quiz_count: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "gpt-4".to_string(),
            timeout_secs: 120,
            outline_minutes: 45,
            poll_count: 5,
            quiz_count: 10,
        }
    }
}

impl GenerationConfig {
    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolves the endpoint settings, letting `CLASSBOT_API_KEY` and
    /// `CLASSBOT_BASE_URL` override the file.
    pub fn resolve(&self) -> Result<ChatCompletionsConfig> {
        let api_key = pick(env_value("CLASSBOT_API_KEY"), self.api_key.as_deref())
            .context("No generation API key. Set generation.api_key or CLASSBOT_API_KEY.")?;
        let base_url = pick(env_value("CLASSBOT_BASE_URL"), self.base_url.as_deref())
            .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string());
        url::Url::parse(&base_url)
            .with_context(|| format!("Invalid generation base URL: {base_url}"))?;
        Ok(ChatCompletionsConfig {
            api_key,
            base_url,
            model: self.model.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlidesConfig {
    pub class_name: String,
    pub instructor: String,
    pub output_dir: PathBuf,
}

impl Default for SlidesConfig {
    fn default() -> Self {
        Self {
            class_name: "Class".to_string(),
            instructor: "Instructor".to_string(),
            output_dir: PathBuf::from("slides"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeworkConfig {
    /// Uploaded assignment files go here.
    pub directory: PathBuf,
}

impl Default for HomeworkConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("homework"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds a poll accepts reactions; 0 means no limit.
    pub window_secs: u64,
}

impl PollConfig {
    pub fn window(&self) -> Option<Duration> {
        (self.window_secs > 0).then(|| Duration::from_secs(self.window_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    /// Directory for daily-rolling log files; stderr when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: Option<PathBuf>,
    pub telegram: TelegramConfig,
    pub generation: GenerationConfig,
    pub slides: SlidesConfig,
    pub homework: HomeworkConfig,
    pub poll: PollConfig,
    pub logging: LoggingConfig,
}

pub mod paths {
    //! Path resolution for classbot configuration and data.
    //!
    //! `CLASSBOT_HOME` wins; otherwise `~/.classbot`.

    use std::path::{Path, PathBuf};

    pub fn classbot_home() -> PathBuf {
        if let Ok(home) = std::env::var("CLASSBOT_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir().map_or_else(|| PathBuf::from(".classbot"), |h| h.join(".classbot"))
    }

    pub fn config_path() -> PathBuf {
        classbot_home().join("config.toml")
    }

    /// Resolves `path` against the classbot home unless it is absolute.
    pub fn resolve(path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            classbot_home().join(path)
        }
    }
}

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

impl Config {
    const DEFAULT_DATABASE: &str = "classbot.db";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the commented default config. Refuses to overwrite.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }
        Self::write_config(path, default_config_template())
    }

    pub fn database_path(&self) -> PathBuf {
        paths::resolve(
            self.database_path
                .as_deref()
                .unwrap_or(Path::new(Self::DEFAULT_DATABASE)),
        )
    }

    pub fn slides_dir(&self) -> PathBuf {
        paths::resolve(&self.slides.output_dir)
    }

    pub fn homework_dir(&self) -> PathBuf {
        paths::resolve(&self.homework.directory)
    }

    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// First non-blank of the environment value and the configured value.
fn pick(env: Option<String>, configured: Option<&str>) -> Option<String> {
    env.as_deref()
        .into_iter()
        .chain(configured)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.generation.model, "gpt-4");
        assert_eq!(config.generation.timeout_secs, 120);
        assert_eq!(config.generation.quiz_count, 10);
        assert_eq!(config.homework.directory, PathBuf::from("homework"));
        assert!(config.poll.window().is_none());
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "database_path = \"/tmp/x.db\"\n[poll]\nwindow_secs = 90\n[slides]\nclass_name = \"BIO 101\"\n[telegram]\nallowlist_chat_ids = [-100]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.poll.window(), Some(Duration::from_secs(90)));
        assert_eq!(config.slides.class_name, "BIO 101");
        assert_eq!(config.slides.instructor, "Instructor");
        assert_eq!(config.telegram.allowlist_chat_ids, vec![-100]);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[poll\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn init_writes_parseable_template_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::init(&path).unwrap();
        assert!(Config::load_from(&path).is_ok());
        assert!(Config::init(&path).is_err());
    }

    #[test]
    fn env_value_wins_over_blank_or_configured() {
        assert_eq!(pick(Some("env".into()), Some("file")), Some("env".into()));
        assert_eq!(pick(Some("  ".into()), Some("file")), Some("file".into()));
        assert_eq!(pick(None, Some("  ")), None);
        assert_eq!(pick(None, None), None);
    }
}
