//! Deepgram live transcription WebSocket client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  send_audio()   │────▶│ audio_tx (mpsc)  │────▶│ Connection Task │──▶ Deepgram
//! └─────────────────┘     └──────────────────┘     └────────┬────────┘
//!                                                           │
//!                         ┌──────────────────┐              │
//!                         │ event_tx (mpsc)  │◀─────────────┘
//!                         └────────┬─────────┘
//!                                  ▼
//!                           STTEventStream (session)
//! ```
//!
//! `send_audio` only ever calls `try_send`, so the audio ingest path never
//! waits on the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{Error as WsError, protocol::Message};
use tracing::{debug, error, info, warn};

use super::config::DeepgramSTTConfig;
use super::messages::{ControlMessage, DeepgramMessage};
use crate::core::stt::base::{
    BaseSTT, STTConnectionState, STTError, STTEvent, STTEventStream, STTResult, TranscriptEvent,
};

/// Maximum audio frame size in bytes (sanity check against buggy clients).
const MAX_AUDIO_CHUNK_SIZE: usize = 256 * 1024;

/// Bounded audio queue. Frames beyond this are rejected rather than buffered.
const AUDIO_CHANNEL_CAPACITY: usize = 64;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `finish` waits for Deepgram to flush and close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Deepgram live transcription adapter.
pub struct DeepgramSTT {
    config: DeepgramSTTConfig,
    state: Arc<RwLock<STTConnectionState>>,
    audio_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeepgramSTT {
    pub fn new(config: DeepgramSTTConfig) -> STTResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Arc::new(RwLock::new(STTConnectionState::Closed)),
            audio_tx: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            connection_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &DeepgramSTTConfig {
        &self.config
    }

    fn build_request(&self) -> STTResult<Request<()>> {
        let url = self.config.build_websocket_url()?;
        let mut request = url.as_str().into_client_request().map_err(|e| {
            STTError::ConnectionFailed(format!("Failed to create WebSocket request: {e}"))
        })?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.config.api_key))
            .map_err(|e| STTError::InvalidConfiguration(format!("Invalid API key: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, auth);
        Ok(request)
    }

    /// Handle one incoming WebSocket message.
    ///
    /// # Returns
    /// * `Ok(true)` - keep reading
    /// * `Ok(false)` - provider closed the stream
    /// * `Err(STTError)` - provider reported an error; the connection is dropped
    pub(crate) async fn handle_websocket_message(
        message: Message,
        event_tx: &mpsc::Sender<STTEvent>,
    ) -> STTResult<bool> {
        match message {
            Message::Text(text) => match DeepgramMessage::parse(&text) {
                Ok(DeepgramMessage::Results(results)) => {
                    let Some(transcript) = results.transcript() else {
                        return Ok(true);
                    };
                    if results.is_final {
                        let event = TranscriptEvent::new(transcript.trim(), true);
                        let _ = event_tx.send(STTEvent::Transcript(event)).await;
                    } else {
                        debug!("Interim transcript: {}", transcript);
                    }
                }
                Ok(DeepgramMessage::UtteranceEnd) => {
                    let _ = event_tx.send(STTEvent::UtteranceEnd).await;
                }
                Ok(DeepgramMessage::SpeechStarted) => {
                    let _ = event_tx.send(STTEvent::SpeechStarted).await;
                }
                Ok(DeepgramMessage::Metadata) => {
                    debug!("Received Deepgram metadata");
                }
                Ok(DeepgramMessage::Error(err)) => {
                    error!(code = ?err.code, "Deepgram STT error: {}", err.message);
                    return Err(STTError::ProviderError(err.message));
                }
                Ok(DeepgramMessage::Unknown(raw)) => {
                    debug!("Received unknown Deepgram message: {}", raw);
                }
                Err(e) => {
                    warn!("Failed to parse Deepgram message: {}", e);
                }
            },
            Message::Close(frame) => {
                info!("Deepgram WebSocket closed: {:?}", frame);
                return Ok(false);
            }
            Message::Binary(_) => debug!("Received unexpected binary message from Deepgram"),
            _ => {}
        }
        Ok(true)
    }
}

fn map_connect_error(error: WsError) -> STTError {
    match error {
        WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            STTError::AuthenticationFailed(format!(
                "Deepgram rejected credentials ({})",
                response.status()
            ))
        }
        other => STTError::ConnectionFailed(format!("Failed to connect to Deepgram: {other}")),
    }
}

struct ConnectionChannels {
    audio_rx: mpsc::Receiver<Bytes>,
    event_tx: mpsc::Sender<STTEvent>,
    shutdown_rx: oneshot::Receiver<()>,
    connected_tx: oneshot::Sender<STTResult<()>>,
}

async fn run_connection(
    request: Request<()>,
    state: Arc<RwLock<STTConnectionState>>,
    channels: ConnectionChannels,
    keepalive: Option<Duration>,
) {
    let ConnectionChannels {
        mut audio_rx,
        event_tx,
        mut shutdown_rx,
        connected_tx,
    } = channels;

    let ws_stream = match connect_async(request).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            let stt_error = map_connect_error(e);
            error!("{}", stt_error);
            *state.write() = STTConnectionState::Closed;
            let _ = connected_tx.send(Err(stt_error));
            return;
        }
    };

    *state.write() = STTConnectionState::Open;
    if connected_tx.send(Ok(())).is_err() {
        // open() already gave up on us
        *state.write() = STTConnectionState::Closed;
        return;
    }
    info!("Connected to Deepgram STT WebSocket");

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let keepalive_period = keepalive.unwrap_or(Duration::from_secs(3600));
    let mut keepalive_tick = interval_at(Instant::now() + keepalive_period, keepalive_period);
    let mut last_audio = Instant::now();
    let mut audio_open = true;
    let mut closing = false;

    loop {
        tokio::select! {
            frame = audio_rx.recv(), if audio_open => match frame {
                Some(frame) => {
                    let len = frame.len();
                    if let Err(e) = ws_sink.send(Message::Binary(frame)).await {
                        let stt_error = STTError::NetworkError(format!("Failed to send audio to Deepgram: {e}"));
                        error!("{}", stt_error);
                        let _ = event_tx.send(STTEvent::Error(stt_error)).await;
                        break;
                    }
                    last_audio = Instant::now();
                    debug!("Sent {} bytes of audio to Deepgram", len);
                }
                None => audio_open = false,
            },

            _ = keepalive_tick.tick(), if keepalive.is_some() && !closing => {
                if last_audio.elapsed() >= keepalive_period {
                    debug!("Sending Deepgram KeepAlive");
                    if let Err(e) = ws_sink.send(Message::Text(ControlMessage::KeepAlive.to_json().into())).await {
                        warn!("Failed to send KeepAlive: {}", e);
                    }
                }
            }

            _ = &mut shutdown_rx, if !closing => {
                info!("Closing Deepgram STT stream");
                closing = true;
                audio_open = false;
                *state.write() = STTConnectionState::Closing;
                if let Err(e) = ws_sink.send(Message::Text(ControlMessage::CloseStream.to_json().into())).await {
                    warn!("Failed to send CloseStream: {}", e);
                    break;
                }
            }

            message = ws_stream.next() => match message {
                Some(Ok(msg)) => match DeepgramSTT::handle_websocket_message(msg, &event_tx).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        let _ = event_tx.send(STTEvent::Error(e)).await;
                        break;
                    }
                },
                Some(Err(e)) => {
                    let stt_error = STTError::NetworkError(format!("WebSocket error: {e}"));
                    error!("{}", stt_error);
                    let _ = event_tx.send(STTEvent::Error(stt_error)).await;
                    break;
                }
                None => {
                    info!("Deepgram WebSocket stream ended");
                    break;
                }
            },
        }
    }

    let _ = ws_sink.close().await;
    *state.write() = STTConnectionState::Closed;
    let _ = event_tx.send(STTEvent::Closed).await;
    info!("Deepgram STT WebSocket connection closed");
}

impl Drop for DeepgramSTT {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.get_mut().take() {
            let _ = shutdown_tx.send(());
        }
    }
}

#[async_trait]
impl BaseSTT for DeepgramSTT {
    async fn open(&self) -> STTResult<STTEventStream> {
        if self.connection_handle.lock().is_some() {
            return Err(STTError::ConnectionFailed(
                "Deepgram connection already opened".to_string(),
            ));
        }

        let request = self.build_request()?;

        let (audio_tx, audio_rx) = mpsc::channel::<Bytes>(AUDIO_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<STTEvent>(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (connected_tx, connected_rx) = oneshot::channel::<STTResult<()>>();

        *self.state.write() = STTConnectionState::Connecting;

        let mut handle = tokio::spawn(run_connection(
            request,
            self.state.clone(),
            ConnectionChannels {
                audio_rx,
                event_tx,
                shutdown_rx,
                connected_tx,
            },
            self.config.keepalive_interval,
        ));

        match timeout(self.config.connect_timeout, connected_rx).await {
            Ok(Ok(Ok(()))) => {
                *self.audio_tx.lock() = Some(audio_tx);
                *self.shutdown_tx.lock() = Some(shutdown_tx);
                *self.connection_handle.lock() = Some(handle);
                info!("Deepgram STT connection confirmed");
                Ok(event_rx)
            }
            Ok(Ok(Err(e))) => {
                let _ = (&mut handle).await;
                Err(e)
            }
            Ok(Err(_)) => {
                *self.state.write() = STTConnectionState::Closed;
                Err(STTError::ConnectionFailed(
                    "Connection task ended before confirming".to_string(),
                ))
            }
            Err(_) => {
                handle.abort();
                *self.state.write() = STTConnectionState::Closed;
                error!(
                    "Deepgram connection timeout after {:?}",
                    self.config.connect_timeout
                );
                Err(STTError::ConnectTimeout(self.config.connect_timeout))
            }
        }
    }

    fn send_audio(&self, frame: Bytes) {
        let state = self.state();
        if state != STTConnectionState::Open {
            warn!(%state, "Deepgram not open, dropping {} byte audio frame", frame.len());
            return;
        }
        if frame.len() > MAX_AUDIO_CHUNK_SIZE {
            warn!(
                "Dropping audio frame of {} bytes (max {} bytes)",
                frame.len(),
                MAX_AUDIO_CHUNK_SIZE
            );
            return;
        }

        let guard = self.audio_tx.lock();
        let Some(audio_tx) = guard.as_ref() else {
            warn!("Deepgram audio channel unavailable, dropping frame");
            return;
        };
        match audio_tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!("Deepgram audio queue full, dropping {} byte frame", frame.len());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Deepgram audio channel closed, dropping frame");
            }
        }
    }

    async fn finish(&self) -> STTResult<()> {
        let handle = self.connection_handle.lock().take();
        let Some(mut handle) = handle else {
            return Ok(());
        };

        {
            let mut state = self.state.write();
            if *state != STTConnectionState::Closed {
                *state = STTConnectionState::Closing;
            }
        }

        self.audio_tx.lock().take();
        if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
            let _ = shutdown_tx.send(());
        }

        if timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
            warn!("Deepgram did not close within {:?}, aborting", CLOSE_TIMEOUT);
            handle.abort();
        }

        *self.state.write() = STTConnectionState::Closed;
        info!("Disconnected from Deepgram STT");
        Ok(())
    }

    fn state(&self) -> STTConnectionState {
        *self.state.read()
    }

    fn provider_info(&self) -> &'static str {
        "Deepgram Live STT"
    }
}
