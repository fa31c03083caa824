//! Provider audio shapes and their normalization into one buffer.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tracing::debug;

use super::base::{TTSError, TTSResult};

/// One event on a push-style audio stream.
#[derive(Debug)]
pub enum PushChunk {
    Data(Bytes),
    End,
    Error(TTSError),
}

/// Audio as handed back by a provider.
pub enum ProviderAudio {
    /// A stream the consumer pulls until exhausted.
    Pull(BoxStream<'static, TTSResult<Bytes>>),
    /// A stream the provider pushes into; complete only once `End` arrives.
    Push(mpsc::Receiver<PushChunk>),
    /// The full payload in one piece.
    Buffer(Bytes),
    /// Anything else, labelled by what the provider returned.
    Unsupported(String),
}

impl std::fmt::Debug for ProviderAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderAudio::Pull(_) => f.write_str("Pull(..)"),
            ProviderAudio::Push(_) => f.write_str("Push(..)"),
            ProviderAudio::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            ProviderAudio::Unsupported(shape) => write!(f, "Unsupported({shape})"),
        }
    }
}

impl ProviderAudio {
    /// Reads the audio to completion.
    ///
    /// Fails on unsupported shapes, on a push stream that closes before
    /// `End`, and on an empty result.
    pub async fn into_bytes(self) -> TTSResult<Bytes> {
        let audio = match self {
            ProviderAudio::Buffer(bytes) => bytes,
            ProviderAudio::Pull(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                buffer.freeze()
            }
            ProviderAudio::Push(mut rx) => {
                let mut buffer = BytesMut::new();
                loop {
                    match rx.recv().await {
                        Some(PushChunk::Data(chunk)) => buffer.extend_from_slice(&chunk),
                        Some(PushChunk::End) => break buffer.freeze(),
                        Some(PushChunk::Error(e)) => return Err(e),
                        None => {
                            return Err(TTSError::StreamInterrupted(
                                "push stream closed before end".to_string(),
                            ));
                        }
                    }
                }
            }
            ProviderAudio::Unsupported(shape) => {
                return Err(TTSError::UnsupportedAudioShape(shape));
            }
        };

        if audio.is_empty() {
            return Err(TTSError::NoAudio);
        }
        debug!("Normalized {} bytes of synthesized audio", audio.len());
        Ok(audio)
    }
}
