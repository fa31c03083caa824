//! Base types for text-to-speech adapters.
//!
//! Providers hand audio back in whatever shape their API offers. Adapters
//! describe that shape as a [`ProviderAudio`] and the provided
//! [`BaseTTS::synthesize`] collapses it into one owned buffer, so nothing
//! past this boundary branches on provider specifics.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::audio::ProviderAudio;

/// Errors raised by text-to-speech adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TTSError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Provider returned {status}: {message}")]
    ProviderError { status: u16, message: String },

    /// The provider answered with an output shape we cannot read.
    #[error("Unsupported audio shape: {0}")]
    UnsupportedAudioShape(String),

    #[error("Provider returned no audio")]
    NoAudio,

    #[error("Audio stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Cannot synthesize empty text")]
    EmptyText,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type TTSResult<T> = Result<T, TTSError>;

#[async_trait]
pub trait BaseTTS: Send + Sync {
    /// Issues the provider request and describes the returned audio.
    async fn request_audio(&self, text: &str) -> TTSResult<ProviderAudio>;

    /// Synthesizes `text` into a single in-memory audio payload.
    async fn synthesize(&self, text: &str) -> TTSResult<Bytes> {
        if text.trim().is_empty() {
            return Err(TTSError::EmptyText);
        }
        self.request_audio(text).await?.into_bytes().await
    }

    fn provider_info(&self) -> &'static str;
}
