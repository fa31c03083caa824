mod config;
mod provider;

pub use config::{DEEPGRAM_TTS_URL, DeepgramTTSConfig};
pub use provider::DeepgramTTS;
