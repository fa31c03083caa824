use thiserror::Error;

use crate::core::stt::STTError;
use crate::core::store::StoreError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A call is already running for this user and character.
    #[error("A voice call is already active for {0}")]
    AlreadyActive(String),

    #[error("No voice call found for {0}")]
    NotFound(String),

    #[error("Character not found: {0}")]
    CharacterNotFound(String),

    #[error("Insufficient coins to start a voice call (1 coin per second), balance {balance}")]
    InsufficientFunds { balance: i64 },

    #[error("Transcription unavailable: {0}")]
    Transcription(#[from] STTError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The service is shutting down and accepts no new calls.
    #[error("Voice call service is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
