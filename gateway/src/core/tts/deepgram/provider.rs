//! Deepgram Aura TTS provider.
//!
//! - Endpoint: `POST https://api.deepgram.com/v1/speak`
//! - Body: `{"text": "..."}`, options as query parameters
//! - Auth: `Authorization: Token <key>`

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error};

use super::config::DeepgramTTSConfig;
use crate::core::tts::audio::ProviderAudio;
use crate::core::tts::base::{BaseTTS, TTSError, TTSResult};

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

pub struct DeepgramTTS {
    config: DeepgramTTSConfig,
    client: reqwest::Client,
}

impl DeepgramTTS {
    pub fn new(config: DeepgramTTSConfig) -> TTSResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                TTSError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &DeepgramTTSConfig {
        &self.config
    }
}

fn is_audio_content_type(content_type: &str) -> bool {
    content_type.starts_with("audio/") || content_type == "application/octet-stream"
}

#[async_trait]
impl BaseTTS for DeepgramTTS {
    async fn request_audio(&self, text: &str) -> TTSResult<ProviderAudio> {
        let url = self.config.build_url()?;

        debug!(
            text_len = text.len(),
            model = %self.config.model,
            "Deepgram TTS synthesis request"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.config.api_key))
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| TTSError::RequestFailed(format!("Deepgram TTS request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Deepgram TTS API error: {}", message);
            return Err(TTSError::ProviderError {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(content_type) = content_type
            && !is_audio_content_type(&content_type)
        {
            return Ok(ProviderAudio::Unsupported(content_type));
        }

        if self.config.stream_response {
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| TTSError::StreamInterrupted(e.to_string())));
            Ok(ProviderAudio::Pull(stream.boxed()))
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|e| TTSError::RequestFailed(format!("Failed to read audio body: {e}")))?;
            Ok(ProviderAudio::Buffer(body))
        }
    }

    fn provider_info(&self) -> &'static str {
        "Deepgram Aura TTS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_api_key() {
        assert!(DeepgramTTS::new(DeepgramTTSConfig::default()).is_err());
    }

    #[test]
    fn test_audio_content_types() {
        assert!(is_audio_content_type("audio/l16;rate=16000"));
        assert!(is_audio_content_type("application/octet-stream"));
        assert!(!is_audio_content_type("application/json"));
    }
}
