//! Content generation collaborator backed by an OpenAI-compatible
//! `/chat/completions` endpoint.

use anyhow::{Context, Result, bail};
use futures_util::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Materials beyond this many characters are cut before prompting.
pub const MATERIAL_CHAR_LIMIT: usize = 4000;

const ASSESSMENT_ROLE: &str = "You are an expert at creating educational assessment questions.";

pub trait Generator: Send + Sync {
    /// Returns outline text for a lecture of `minutes` built from `materials`.
    fn generate_outline(
        &self,
        materials: Vec<String>,
        minutes: u32,
    ) -> BoxFuture<'_, Result<String>>;

    /// Returns poll text in the `Question N: / A) .. / Correct: X` shape.
    fn generate_poll_questions(
        &self,
        outline: String,
        count: u32,
    ) -> BoxFuture<'_, Result<String>>;

    /// Returns a multiple-choice quiz with its answer key.
    fn generate_quiz(&self, outline: String, count: u32) -> BoxFuture<'_, Result<String>>;

    /// Returns `quiz` rewritten with the correct answers hidden.
    fn hide_quiz_answers(&self, quiz: String) -> BoxFuture<'_, Result<String>>;

    /// Returns a homework assignment, solutions included, for `outline`.
    fn generate_homework(&self, outline: String) -> BoxFuture<'_, Result<String>>;

    /// Returns the student version of `homework`: questions and
    /// instructions only.
    fn strip_homework_solutions(&self, homework: String) -> BoxFuture<'_, Result<String>>;
}

#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

pub struct ChatCompletionsGenerator {
    config: ChatCompletionsConfig,
    headers: HeaderMap,
    http: reqwest::Client,
}

impl ChatCompletionsGenerator {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self> {
        url::Url::parse(&config.base_url)
            .with_context(|| format!("Invalid generation base URL: {}", config.base_url))?;
        let headers = build_headers(&config.api_key)?;
        Ok(Self {
            config,
            headers,
            http: reqwest::Client::new(),
        })
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        );
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
        };
        let response = self
            .http
            .post(&url)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("generation endpoint returned {status}: {}", body.trim());
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to decode chat completion response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            bail!("generation endpoint returned an empty completion");
        }
        Ok(content)
    }
}

impl Generator for ChatCompletionsGenerator {
    fn generate_outline(
        &self,
        materials: Vec<String>,
        minutes: u32,
    ) -> BoxFuture<'_, Result<String>> {
        let prompt = outline_prompt(&materials, minutes);
        Box::pin(self.complete(vec![ChatMessage::system(prompt)]))
    }

    fn generate_poll_questions(
        &self,
        outline: String,
        count: u32,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.complete(vec![
            ChatMessage::system(ASSESSMENT_ROLE.to_string()),
            ChatMessage::user(poll_prompt(&outline, count)),
        ]))
    }

    fn generate_quiz(&self, outline: String, count: u32) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.complete(vec![
            ChatMessage::system(ASSESSMENT_ROLE.to_string()),
            ChatMessage::user(format!(
                "Generate a {count}-question multiple choice quiz based on the content below. \
                 Give each question options A-D and include the correct answers.\n\n{outline}"
            )),
        ]))
    }

    fn hide_quiz_answers(&self, quiz: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.complete(vec![ChatMessage::system(format!(
            "Return the following quiz with the correct answers hidden:\n\n{quiz}"
        ))]))
    }

    fn generate_homework(&self, outline: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.complete(vec![
            ChatMessage::system(ASSESSMENT_ROLE.to_string()),
            ChatMessage::user(format!(
                "Write a homework assignment of 3 to 5 problems based on the outline below. \
                 Number the problems and give a worked solution after each one.\n\n{outline}"
            )),
        ]))
    }

    fn strip_homework_solutions(&self, homework: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.complete(vec![ChatMessage::system(format!(
            "Remove all solutions and answers from this homework assignment, keeping only the \
             questions and any necessary context or instructions:\n\n{homework}"
        ))]))
    }
}

fn build_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .context("generation API key is not a valid HTTP header value")?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Joins materials and cuts the result at [`MATERIAL_CHAR_LIMIT`] characters.
pub fn truncate_materials(materials: &[String]) -> String {
    let joined = materials.join("\n\n");
    match joined.char_indices().nth(MATERIAL_CHAR_LIMIT) {
        Some((cut, _)) => joined[..cut].to_string(),
        None => joined,
    }
}

fn outline_prompt(materials: &[String], minutes: u32) -> String {
    format!(
        "Create a highly detailed, lecture-ready outline for a {minutes}-minute class on the \
         following material:\n\n{}\n\n\
         Number each main section with a Roman numeral heading on its own line (I., II., ...). \
         For each main section, include:\n\
         1. A clear and concise definition or explanation of the concept.\n\
         2. Real-world applications or examples that illustrate the concept.\n\
         3. Detailed steps or methodologies if applicable.\n\
         4. Key subtopics or subheadings under each main section.\n\
         5. Important takeaways or key points to remember.\n\
         Directly state the concepts rather than describing which concepts to cover. \
         Each main section should contain at least 5 sentences.",
        truncate_materials(materials)
    )
}

fn poll_prompt(outline: &str, count: u32) -> String {
    format!(
        "Create {count} multiple choice questions. Each question should have 4 options (A-D). \
         Use exactly this format with no other text:\n\
         Question 1: [Question]\n\
         A) [Option]\n\
         B) [Option]\n\
         C) [Option]\n\
         D) [Option]\n\
         Correct: [A-D]\n\n\
         Base the questions on this outline:\n\n{outline}"
    )
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn system(content: String) -> Self {
        Self {
            role: "system",
            content,
        }
    }

    fn user(content: String) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
