//! WebSocket message types for the Deepgram live transcription API.
//!
//! Incoming messages are JSON text frames tagged by `type`:
//! `Results`, `UtteranceEnd`, `SpeechStarted`, `Metadata` and `Error`.
//! Outgoing control messages are `KeepAlive` and `CloseStream`; audio is
//! sent as raw binary frames.

use serde::{Deserialize, Serialize};

/// A single transcription hypothesis.
#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

/// Transcription results for a span of audio.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsMessage {
    #[serde(default)]
    pub channel: Channel,
    /// The provider will not revise this span further.
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
}

impl ResultsMessage {
    /// Best transcript, if the provider returned a non-blank one.
    pub fn transcript(&self) -> Option<&str> {
        self.channel
            .alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    #[serde(default, alias = "description")]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Parsed server message.
#[derive(Debug, Clone)]
pub enum DeepgramMessage {
    Results(ResultsMessage),
    UtteranceEnd,
    SpeechStarted,
    Metadata,
    Error(ErrorMessage),
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    message_type: String,
}

impl DeepgramMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let message = match envelope.message_type.as_str() {
            "Results" => DeepgramMessage::Results(serde_json::from_str(text)?),
            "UtteranceEnd" => DeepgramMessage::UtteranceEnd,
            "SpeechStarted" => DeepgramMessage::SpeechStarted,
            "Metadata" => DeepgramMessage::Metadata,
            "Error" => DeepgramMessage::Error(serde_json::from_str(text)?),
            _ => DeepgramMessage::Unknown(text.to_string()),
        };
        Ok(message)
    }
}

/// Outgoing control message.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    KeepAlive,
    CloseStream,
}

impl ControlMessage {
    pub fn to_json(self) -> String {
        match self {
            ControlMessage::KeepAlive => r#"{"type":"KeepAlive"}"#.to_string(),
            ControlMessage::CloseStream => r#"{"type":"CloseStream"}"#.to_string(),
        }
    }
}
