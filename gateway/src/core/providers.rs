//! Upstream provider wiring.

use std::sync::Arc;

use thiserror::Error;

use crate::config::GatewayConfig;
use crate::core::llm::{ChatCompletion, GenerationError, OpenRouterClient};
use crate::core::stt::{BaseSTT, STTError, STTProvider, STTResult, create_stt_provider};
use crate::core::tts::{BaseTTS, DeepgramTTS, TTSError};

/// Builds a fresh transcription adapter for each call.
pub type STTFactory = Arc<dyn Fn() -> STTResult<Arc<dyn BaseSTT>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum ProviderSetupError {
    #[error("STT setup failed: {0}")]
    Stt(#[from] STTError),
    #[error("TTS setup failed: {0}")]
    Tts(#[from] TTSError),
    #[error("LLM setup failed: {0}")]
    Llm(#[from] GenerationError),
}

/// Transcription is per call; synthesis and chat clients are shared.
#[derive(Clone)]
pub struct Providers {
    pub stt: STTFactory,
    pub tts: Arc<dyn BaseTTS>,
    pub llm: Arc<dyn ChatCompletion>,
}

impl Providers {
    pub fn new(stt: STTFactory, tts: Arc<dyn BaseTTS>, llm: Arc<dyn ChatCompletion>) -> Self {
        Self { stt, tts, llm }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, ProviderSetupError> {
        let stt_config = config.deepgram_stt_config();
        // fail at startup rather than on the first call
        stt_config.validate()?;
        let stt: STTFactory =
            Arc::new(move || create_stt_provider(STTProvider::Deepgram, stt_config.clone()));

        let tts: Arc<dyn BaseTTS> = Arc::new(DeepgramTTS::new(config.deepgram_tts_config())?);
        let llm: Arc<dyn ChatCompletion> =
            Arc::new(OpenRouterClient::new(config.openrouter_config())?);

        Ok(Self { stt, tts, llm })
    }
}
