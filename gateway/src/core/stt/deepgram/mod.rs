//! Deepgram live transcription (`/v1/listen`) integration.
//!
//! - [`config`]: live options and URL construction
//! - [`messages`]: server messages and control frames
//! - [`client`]: the [`DeepgramSTT`] adapter
//!
//! Audio is streamed as binary frames; the provider answers with interim and
//! final `Results`. Only final, non-blank transcripts are surfaced.

mod client;
mod config;
mod messages;

pub use client::DeepgramSTT;
pub use config::{DEEPGRAM_LISTEN_URL, DeepgramSTTConfig};
pub use messages::{ControlMessage, DeepgramMessage, ResultsMessage};
