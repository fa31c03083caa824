//! Configuration for the Deepgram live transcription client.

use std::time::Duration;

use url::Url;

use crate::core::stt::base::{STTError, STTResult};

/// Default Deepgram live transcription endpoint.
pub const DEEPGRAM_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Live connection options sent as query parameters on the listen URL.
#[derive(Debug, Clone)]
pub struct DeepgramSTTConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: String,
    pub smart_format: bool,
    pub interim_results: bool,
    /// Silence gap (ms) after which Deepgram reports `UtteranceEnd`.
    /// `None` disables utterance end events.
    pub utterance_end_ms: Option<u32>,
    pub vad_events: bool,
    pub endpointing_ms: Option<u32>,
    /// Raw encoding of the audio frames. `None` lets Deepgram sniff a container.
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    pub connect_timeout: Duration,
    /// A `KeepAlive` is sent when no audio has been forwarded for this long.
    pub keepalive_interval: Option<Duration>,
}

impl Default for DeepgramSTTConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEEPGRAM_LISTEN_URL.to_string(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            smart_format: true,
            interim_results: true,
            utterance_end_ms: Some(1000),
            vad_events: true,
            endpointing_ms: Some(300),
            encoding: Some("opus".to_string()),
            sample_rate: None,
            connect_timeout: Duration::from_secs(15),
            keepalive_interval: Some(Duration::from_secs(8)),
        }
    }
}

impl DeepgramSTTConfig {
    /// Build the listen URL with all live options encoded as query parameters.
    pub fn build_websocket_url(&self) -> STTResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            STTError::InvalidConfiguration(format!("Invalid Deepgram URL '{}': {e}", self.base_url))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("model", &self.model);
            query.append_pair("language", &self.language);
            query.append_pair("smart_format", bool_str(self.smart_format));
            query.append_pair("interim_results", bool_str(self.interim_results));
            query.append_pair("vad_events", bool_str(self.vad_events));
            if let Some(ms) = self.utterance_end_ms {
                query.append_pair("utterance_end_ms", &ms.to_string());
            }
            if let Some(ms) = self.endpointing_ms {
                query.append_pair("endpointing", &ms.to_string());
            }
            if let Some(encoding) = &self.encoding {
                query.append_pair("encoding", encoding);
            }
            if let Some(rate) = self.sample_rate {
                query.append_pair("sample_rate", &rate.to_string());
            }
        }

        Ok(url)
    }

    pub fn validate(&self) -> STTResult<()> {
        if self.api_key.is_empty() {
            return Err(STTError::AuthenticationFailed(
                "API key is required for Deepgram STT".to_string(),
            ));
        }
        // utterance_end_ms requires interim results on the provider side
        if self.utterance_end_ms.is_some() && !self.interim_results {
            return Err(STTError::InvalidConfiguration(
                "utterance_end_ms requires interim_results".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(STTError::InvalidConfiguration(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
