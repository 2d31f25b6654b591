use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.mistral.ai/v1/chat/completions";

pub const DEFAULT_CHAT_MODEL: &str = "mistral-large-latest";

/// A hosted language model: prompt in, free-form text out.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone)]
pub struct ChatCompletionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for ChatCompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

impl ChatCompletionConfig {
    /// Reads `TENDERDOC_LLM_ENDPOINT`, `TENDERDOC_LLM_MODEL` and
    /// `MISTRAL_API_KEY`; blank values count as unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env_value("TENDERDOC_LLM_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: env_value("MISTRAL_API_KEY"),
            model: env_value("TENDERDOC_LLM_MODEL").unwrap_or(defaults.model),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| non_blank(&value))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `chat/completions` endpoints (Mistral,
/// OpenAI, vLLM, Ollama).
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
}

impl ChatCompletionClient {
    pub fn new(config: ChatCompletionConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::new(),
            endpoint: Url::parse(&config.endpoint)?,
            api_key: config.api_key,
            model: config.model,
        })
    }

    pub fn from_env() -> Result<Self, LlmError> {
        let config = ChatCompletionConfig::from_env();
        if config.api_key.is_none() {
            return Err(LlmError::MissingConfig(
                "MISTRAL_API_KEY is not set".to_string(),
            ));
        }
        Self::new(config)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionModel for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let payload = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BackendResponse {
                endpoint: self.endpoint.to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        completion_text(parsed)
    }
}

fn completion_text(response: ChatResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .and_then(|content| non_blank(&content))
        .ok_or(LlmError::EmptyCompletion)
}
