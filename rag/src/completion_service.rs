use crate::config::Settings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub const OPENAI_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const PERPLEXITY_SEARCH_MODEL: &str = "sonar";
pub const PERPLEXITY_ANSWER_MODEL: &str = "sonar-pro";

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("the model provider rejected the API key (status {0})")]
    Unauthorized(u16),
    #[error("the model provider answered with a non-JSON body (status {status}): {preview}")]
    NonJson { status: u16, preview: String },
    #[error("model provider error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("the model returned no content")]
    EmptyResponse,
    #[error("request to the model provider failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        CompletionError::Transport(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Falls back to the backend's default model when unset.
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub content: String,
    /// Citation URLs, when the provider returns any.
    pub sources: Vec<String>,
    pub model: String,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError>;
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any provider exposing an OpenAI-style `/chat/completions`
/// endpoint. Used for both OpenAI and Perplexity.
pub struct OpenAiCompatibleChat {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiCompatibleChat {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
        }
    }

    pub fn openai(settings: &Settings) -> Self {
        Self::new(&settings.openai_api_key, &settings.openai_base_url, OPENAI_CHAT_MODEL)
    }

    /// `None` when no Perplexity key is configured.
    pub fn perplexity(settings: &Settings) -> Option<Self> {
        settings.perplexity_api_key.as_ref().map(|key| {
            Self::new(key, &settings.perplexity_base_url, PERPLEXITY_SEARCH_MODEL)
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let body = ChatRequestBody {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        log::info!(
            "Sending chat completion to {} (model {}, {} messages)",
            self.base_url,
            model,
            request.messages.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed = parse_completion(status, &text)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        Ok(Completion {
            content,
            sources: parsed.citations,
            model: parsed.model.unwrap_or_else(|| model.to_string()),
        })
    }
}

fn parse_completion(status: StatusCode, text: &str) -> Result<ChatResponseBody, CompletionError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(CompletionError::Unauthorized(status.as_u16()));
    }

    let value: serde_json::Value = serde_json::from_str(text).map_err(|_| {
        log::error!("Model provider returned non-JSON body ({})", status);
        CompletionError::NonJson {
            status: status.as_u16(),
            preview: text.chars().take(200).collect(),
        }
    })?;

    if !status.is_success() {
        let message = value["error"]["message"]
            .as_str()
            .or_else(|| value["error"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
        return Err(CompletionError::Api { status: status.as_u16(), message });
    }

    serde_json::from_value(value).map_err(|e| CompletionError::Api {
        status: status.as_u16(),
        message: format!("unexpected response shape: {e}"),
    })
}
