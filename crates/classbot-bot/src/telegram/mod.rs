use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use classbot_core::config::Config;
use reqwest::multipart;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::commands::TelegramCommandSpec;

mod types;

pub use types::{
    CallbackQuery, Document, InlineKeyboardButton, InlineKeyboardMarkup, Message, TelegramFile,
    Update,
};

const TOKEN_ENV: &str = "CLASSBOT_TELEGRAM_BOT_TOKEN";
const SLIDE_MIME: &str = "image/svg+xml";

pub struct TelegramSettings {
    pub bot_token: String,
    pub allowlist_user_ids: HashSet<i64>,
    pub allowlist_chat_ids: HashSet<i64>,
}

impl TelegramSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config
            .telegram
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .or_else(|| {
                std::env::var(TOKEN_ENV)
                    .ok()
                    .map(|token| token.trim().to_string())
                    .filter(|token| !token.is_empty())
            })
            .unwrap_or_default();
        if token.is_empty() {
            bail!("telegram.bot_token or {TOKEN_ENV} is required");
        }

        let allowlist_user_ids: HashSet<i64> =
            config.telegram.allowlist_user_ids.iter().copied().collect();
        if allowlist_user_ids.is_empty() {
            bail!("telegram.allowlist_user_ids must contain at least one user ID");
        }

        Ok(Self {
            bot_token: token,
            allowlist_user_ids,
            allowlist_chat_ids: config.telegram.allowlist_chat_ids.iter().copied().collect(),
        })
    }
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, "https://api.telegram.org")
    }

    pub fn with_base_url(token: String, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: Some(vec!["message", "callback_query"]),
        };
        self.post("getUpdates", &request).await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<TelegramFile> {
        let request = GetFileRequest { file_id };
        self.post("getFile", &request).await
    }

    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/file/bot{}/{}", self.base_url, self.token, file_path);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("Telegram file download failed")?;

        if !response.status().is_success() {
            bail!(
                "Telegram file download failed with status {}",
                response.status()
            );
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read Telegram file bytes")?;
        Ok(bytes.to_vec())
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_to_message_id,
            allow_sending_without_reply: reply_to_message_id.map(|_| true),
            reply_markup: keyboard,
        };
        self.post("sendMessage", &request).await
    }

    /// Uploads a rendered slide as a document.
    pub async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read slide {}", path.display()))?;
        let file_name = path
            .file_name()
            .map_or_else(|| "slide.svg".to_string(), |name| name.to_string_lossy().into_owned());
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(SLIDE_MIME)?;

        let mut form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        if let Some(keyboard) = keyboard {
            form = form.text("reply_markup", serde_json::to_string(keyboard)?);
        }

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .context("Telegram request failed")?;
        decode(response).await
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<()> {
        let request = AnswerCallbackQueryRequest {
            callback_query_id,
            text,
        };
        let _: bool = self.post("answerCallbackQuery", &request).await?;
        Ok(())
    }

    pub async fn set_my_commands(&self, commands: &[TelegramCommandSpec]) -> Result<()> {
        let request = SetMyCommandsRequest { commands };
        let _: bool = self.post("setMyCommands", &request).await?;
        Ok(())
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, method: &str, body: &B) -> Result<T> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .context("Telegram request failed")?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let payload: TelegramResponse<T> = response
        .json()
        .await
        .context("Failed to decode Telegram response")?;

    if !payload.ok {
        let description = payload
            .description
            .unwrap_or_else(|| "Telegram API error".to_string());
        bail!("{}", description);
    }

    payload
        .result
        .context("Telegram response is missing a result")
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_updates: Option<Vec<&'static str>>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allow_sending_without_reply: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct GetFileRequest<'a> {
    file_id: &'a str,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryRequest<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SetMyCommandsRequest<'a> {
    commands: &'a [TelegramCommandSpec],
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_with(token: Option<&str>, users: Vec<i64>) -> Config {
        let mut config = Config::default();
        config.telegram.bot_token = token.map(str::to_string);
        config.telegram.allowlist_user_ids = users;
        config
    }

    #[test]
    fn settings_require_allowlisted_users() {
        let err = TelegramSettings::from_config(&config_with(Some("t"), vec![]))
            .err()
            .unwrap();
        assert!(err.to_string().contains("allowlist_user_ids"));

        let settings = TelegramSettings::from_config(&config_with(Some(" t "), vec![7])).unwrap();
        assert_eq!(settings.bot_token, "t");
        assert!(settings.allowlist_user_ids.contains(&7));
    }

    #[tokio::test]
    async fn get_updates_asks_for_messages_and_callbacks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(json!({
                "offset": 5,
                "allowed_updates": ["message", "callback_query"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [{"update_id": 5, "message": {"message_id": 1, "chat": {"id": 2, "type": "private"}, "text": "/next"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::with_base_url("TOKEN".into(), server.uri());
        let updates = client
            .get_updates(Some(5), Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].message.as_ref().unwrap().text.as_deref(), Some("/next"));
    }

    #[tokio::test]
    async fn api_errors_surface_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::with_base_url("TOKEN".into(), server.uri());
        let err = client.send_message(1, "hi", None, None).await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn send_document_uploads_slide_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendDocument"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 10, "chat": {"id": 2, "type": "private"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let slide = dir.path().join("slide_0.svg");
        std::fs::write(&slide, "<svg/>").unwrap();

        let client = TelegramClient::with_base_url("TOKEN".into(), server.uri());
        let sent = client
            .send_document(2, &slide, Some("Slide 1/1"), None)
            .await
            .unwrap();
        assert_eq!(sent.message_id, 10);

        let missing = client
            .send_document(2, &dir.path().join("nope.svg"), None, None)
            .await;
        assert!(missing.is_err());
    }
}
