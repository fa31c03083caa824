//! OpenRouter chat-completion client.
//!
//! - Endpoint: `POST {base_url}/chat/completions` (OpenAI-compatible)
//! - Auth: `Authorization: Bearer <key>`, attribution via `HTTP-Referer` and `X-Title`

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::base::{ChatCompletion, ChatMessage, GenerationError, GenerationResult};

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub referer: String,
    pub title: String,
    pub timeout: Duration,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: OPENROUTER_API_URL.to_string(),
            model: "x-ai/grok-code-fast-1".to_string(),
            max_tokens: 30,
            temperature: 0.7,
            top_p: 0.8,
            frequency_penalty: 0.6,
            presence_penalty: 0.5,
            referer: "http://localhost:5002".to_string(),
            title: "Character Voice Chat".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl OpenRouterConfig {
    pub fn validate(&self) -> GenerationResult<()> {
        if self.api_key.is_empty() {
            return Err(GenerationError::InvalidConfiguration(
                "API key is required for OpenRouter".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(GenerationError::InvalidConfiguration(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenRouterClient {
    config: OpenRouterConfig,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> GenerationResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                GenerationError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }
}

#[async_trait]
impl ChatCompletion for OpenRouterClient {
    async fn complete(&self, messages: &[ChatMessage]) -> GenerationResult<String> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            frequency_penalty: self.config.frequency_penalty,
            presence_penalty: self.config.presence_penalty,
        };

        debug!(
            model = %self.config.model,
            history_len = messages.len().saturating_sub(2),
            "OpenRouter chat completion request"
        );

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.config.timeout)
                } else {
                    GenerationError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "OpenRouter API error: {}", body);
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| GenerationError::Malformed("No content in first choice".to_string()))?;

        Ok(content)
    }

    fn provider_info(&self) -> &'static str {
        "OpenRouter"
    }
}
