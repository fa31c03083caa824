use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::memory::{ConversationTurn, TurnRole};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Chat completion request failed: {0}")]
    Request(String),

    #[error("Chat completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Chat completion returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed chat completion response: {0}")]
    Malformed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type GenerationResult<T> = Result<T, GenerationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            TurnRole::User => ChatRole::User,
            TurnRole::Assistant => ChatRole::Assistant,
        };
        Self {
            role,
            content: turn.content.clone(),
        }
    }
}

/// A single request/response chat-completion endpoint.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Returns the trimmed text of the first choice.
    async fn complete(&self, messages: &[ChatMessage]) -> GenerationResult<String>;

    fn provider_info(&self) -> &'static str;
}
