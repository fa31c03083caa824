mod audio;
mod base;
pub mod cleanup;
pub mod deepgram;

pub use audio::{ProviderAudio, PushChunk};
pub use base::{BaseTTS, TTSError, TTSResult};
pub use cleanup::{NEUTRAL_UTTERANCE, clean_for_speech};
pub use deepgram::{DEEPGRAM_TTS_URL, DeepgramTTS, DeepgramTTSConfig};
