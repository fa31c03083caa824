mod base;
pub mod deepgram;

pub use base::{
    BaseSTT, STTConnectionState, STTError, STTEvent, STTEventStream, STTResult, TranscriptEvent,
    now_millis,
};
pub use deepgram::{DeepgramSTT, DeepgramSTTConfig};

use std::sync::Arc;

/// Supported STT providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum STTProvider {
    /// Deepgram live transcription WebSocket API
    Deepgram,
}

impl std::fmt::Display for STTProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            STTProvider::Deepgram => write!(f, "deepgram"),
        }
    }
}

impl std::str::FromStr for STTProvider {
    type Err = STTError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deepgram" => Ok(STTProvider::Deepgram),
            _ => Err(STTError::InvalidConfiguration(format!(
                "Unsupported STT provider: {s}. Supported providers: deepgram"
            ))),
        }
    }
}

/// Creates a fresh, unopened adapter. Each session owns its own connection.
pub fn create_stt_provider(
    provider: STTProvider,
    config: DeepgramSTTConfig,
) -> STTResult<Arc<dyn BaseSTT>> {
    match provider {
        STTProvider::Deepgram => Ok(Arc::new(DeepgramSTT::new(config)?)),
    }
}
