use std::time::Duration;

use url::Url;

use crate::core::tts::base::{TTSError, TTSResult};

/// Deepgram speak endpoint.
pub const DEEPGRAM_TTS_URL: &str = "https://api.deepgram.com/v1/speak";

#[derive(Debug, Clone)]
pub struct DeepgramTTSConfig {
    pub api_key: String,
    pub base_url: String,
    /// Aura voice model, e.g. `aura-luna-en`.
    pub model: String,
    pub encoding: String,
    pub sample_rate: Option<u32>,
    /// `none` returns headerless audio.
    pub container: Option<String>,
    pub request_timeout: Duration,
    /// Read the response body as a chunked stream instead of one buffer.
    pub stream_response: bool,
}

impl Default for DeepgramTTSConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEEPGRAM_TTS_URL.to_string(),
            model: "aura-luna-en".to_string(),
            encoding: "linear16".to_string(),
            sample_rate: Some(16000),
            container: Some("none".to_string()),
            request_timeout: Duration::from_secs(15),
            stream_response: true,
        }
    }
}

impl DeepgramTTSConfig {
    pub fn build_url(&self) -> TTSResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            TTSError::InvalidConfiguration(format!("Invalid Deepgram URL '{}': {e}", self.base_url))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("model", &self.model);
            query.append_pair("encoding", &self.encoding);
            if let Some(rate) = self.sample_rate {
                query.append_pair("sample_rate", &rate.to_string());
            }
            if let Some(container) = &self.container {
                query.append_pair("container", container);
            }
        }
        Ok(url)
    }

    pub fn validate(&self) -> TTSResult<()> {
        if self.api_key.is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "API key is required for Deepgram TTS".to_string(),
            ));
        }
        if self.model.is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "Deepgram TTS model must not be empty".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(TTSError::InvalidConfiguration(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
