//! Base types for streaming speech-to-text adapters.
//!
//! An adapter wraps one live provider connection. It accepts binary audio
//! frames, and reports what the provider hears as a typed stream of
//! [`STTEvent`]s returned from [`BaseSTT::open`].
//!
//! # Connection lifecycle
//!
//! ```text
//! Connecting ──▶ Open ──▶ Closing ──▶ Closed
//!      │           │          │
//!      └───────────┴──────────┴──(error)──▶ Closed
//! ```

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by speech-to-text adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum STTError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The provider did not confirm the connection within the bounded window.
    #[error("Connection not confirmed within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Not connected")]
    NotConnected,
}

pub type STTResult<T> = Result<T, STTError>;

/// Connection state of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum STTConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl STTConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            STTConnectionState::Connecting => "connecting",
            STTConnectionState::Open => "open",
            STTConnectionState::Closing => "closing",
            STTConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for STTConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transcription result for one utterance segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
            timestamp: now_millis(),
        }
    }
}

/// Events reported by an open adapter, in provider arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum STTEvent {
    /// A final transcript. Interim results never leave the adapter.
    Transcript(TranscriptEvent),
    SpeechStarted,
    UtteranceEnd,
    Error(STTError),
    /// The connection is gone. Always the last event on the stream.
    Closed,
}

/// Receiving half of an adapter's event stream.
pub type STTEventStream = mpsc::Receiver<STTEvent>;

/// A live speech-to-text connection.
///
/// Implementations use interior mutability so a single adapter can be shared
/// between the audio ingest path and the session's teardown path.
#[async_trait]
pub trait BaseSTT: Send + Sync {
    /// Opens the provider connection and resolves once the provider confirms it.
    ///
    /// Fails with [`STTError::ConnectTimeout`] when no confirmation arrives in
    /// the configured window.
    async fn open(&self) -> STTResult<STTEventStream>;

    /// Forwards one audio frame. Never blocks; frames sent while the
    /// adapter is not open are dropped with a warning.
    fn send_audio(&self, frame: Bytes);

    /// Requests a graceful close and waits for the connection to wind down.
    async fn finish(&self) -> STTResult<()>;

    fn state(&self) -> STTConnectionState;

    fn provider_info(&self) -> &'static str;
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
