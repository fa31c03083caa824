//! Named domain events emitted by a session.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::SessionKey;
use crate::core::transport::EventTransport;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    Requested,
    ClientDisconnected,
    ProviderClosed,
    InsufficientFunds,
    Idle,
    Shutdown,
    ConnectFailed,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Requested => "requested",
            EndReason::ClientDisconnected => "client-disconnected",
            EndReason::ProviderClosed => "provider-closed",
            EndReason::InsufficientFunds => "insufficient-funds",
            EndReason::Idle => "idle",
            EndReason::Shutdown => "shutdown",
            EndReason::ConnectFailed => "connect-failed",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// End-of-call report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub duration_seconds: u64,
    pub coins_spent: u64,
    pub reason: EndReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transcript {
        user_id: String,
        username: String,
        text: String,
        is_final: bool,
        timestamp: u64,
    },
    AiResponse {
        character_id: String,
        character_name: String,
        text: String,
        timestamp: u64,
    },
    AudioGenerated {
        character_id: String,
        character_name: String,
        audio: Bytes,
        /// The text that was actually spoken.
        text: String,
        timestamp: u64,
    },
    SpeechStarted,
    UtteranceEnd,
    ConnectionClosed,
    Error {
        message: String,
        timestamp: u64,
    },
    CallEnded(ConversationStats),
    InsufficientFunds {
        message: String,
        coins_spent: u64,
        duration: u64,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Transcript { .. } => "transcript",
            SessionEvent::AiResponse { .. } => "aiResponse",
            SessionEvent::AudioGenerated { .. } => "audioGenerated",
            SessionEvent::SpeechStarted => "speechStarted",
            SessionEvent::UtteranceEnd => "utteranceEnd",
            SessionEvent::ConnectionClosed => "connectionClosed",
            SessionEvent::Error { .. } => "error",
            SessionEvent::CallEnded(_) => "callEnded",
            SessionEvent::InsufficientFunds { .. } => "insufficient-funds",
        }
    }

    /// JSON payload as published on the transport. Audio is base64.
    pub fn payload(&self) -> Value {
        match self {
            SessionEvent::Transcript {
                user_id,
                username,
                text,
                is_final,
                timestamp,
            } => json!({
                "userId": user_id,
                "username": username,
                "text": text,
                "isFinal": is_final,
                "timestamp": timestamp,
            }),
            SessionEvent::AiResponse {
                character_id,
                character_name,
                text,
                timestamp,
            } => json!({
                "characterId": character_id,
                "characterName": character_name,
                "text": text,
                "timestamp": timestamp,
            }),
            SessionEvent::AudioGenerated {
                character_id,
                character_name,
                audio,
                text,
                timestamp,
            } => json!({
                "characterId": character_id,
                "characterName": character_name,
                "audio": BASE64.encode(audio),
                "text": text,
                "timestamp": timestamp,
            }),
            SessionEvent::SpeechStarted
            | SessionEvent::UtteranceEnd
            | SessionEvent::ConnectionClosed => json!({}),
            SessionEvent::Error { message, timestamp } => json!({
                "message": message,
                "timestamp": timestamp,
            }),
            SessionEvent::CallEnded(stats) => json!({
                "reason": stats.reason,
                "durationSeconds": stats.duration_seconds,
                "coinsSpent": stats.coins_spent,
            }),
            SessionEvent::InsufficientFunds {
                message,
                coins_spent,
                duration,
            } => json!({
                "message": message,
                "coinsSpent": coins_spent,
                "duration": duration,
            }),
        }
    }
}

/// Per-session event bus: every event goes to the external transport and to
/// local subscribers.
pub struct EventBus {
    key: SessionKey,
    transport: Arc<dyn EventTransport>,
    local: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(key: SessionKey, transport: Arc<dyn EventTransport>) -> Self {
        let (local, _rx) = broadcast::channel(256);
        Self {
            key,
            transport,
            local,
        }
    }

    pub fn emit(&self, event: SessionEvent) {
        self.transport
            .publish(&self.key, event.name(), event.payload());
        let _ = self.local.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.local.subscribe()
    }
}
