//! WebSocket mock of the Deepgram live transcription endpoint.
//!
//! Every binary audio frame is answered with an interim and a final
//! `Results` message carrying the next scripted transcript.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

pub struct DeepgramLiveMockState {
    pub expected_token: String,
    /// One transcript per audio frame, in order.
    pub transcripts: Vec<String>,
    /// Close the socket after this many audio frames.
    pub close_after_frames: Option<u64>,
    pub connection_count: AtomicU64,
    pub audio_frames: AtomicU64,
    pub close_streams: AtomicU64,
    pub keepalives: AtomicU64,
}

impl DeepgramLiveMockState {
    pub fn new(expected_token: &str, transcripts: &[&str]) -> Self {
        Self {
            expected_token: expected_token.to_string(),
            transcripts: transcripts.iter().map(|t| t.to_string()).collect(),
            close_after_frames: None,
            connection_count: AtomicU64::new(0),
            audio_frames: AtomicU64::new(0),
            close_streams: AtomicU64::new(0),
            keepalives: AtomicU64::new(0),
        }
    }

    pub fn closing_after(mut self, frames: u64) -> Self {
        self.close_after_frames = Some(frames);
        self
    }
}

fn results(transcript: &str, is_final: bool) -> Message {
    let message = json!({
        "type": "Results",
        "channel_index": [0, 1],
        "duration": 0.5,
        "is_final": is_final,
        "speech_final": is_final,
        "channel": {
            "alternatives": [{
                "transcript": transcript,
                "confidence": 0.97,
            }]
        }
    });
    Message::Text(message.to_string().into())
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<DeepgramLiveMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let expected = format!("Token {}", state.expected_token);
    let ws_stream = accept_hdr_async(stream, |request: &Request, response: Response| {
        let authorized = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some(expected.as_str());
        if authorized {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some("invalid credentials".to_string()));
            *rejection.status_mut() = StatusCode::UNAUTHORIZED;
            Err(rejection)
        }
    })
    .await?;
    let (mut write, mut read) = ws_stream.split();

    let conn_id = state.connection_count.fetch_add(1, Ordering::Relaxed) + 1;
    let metadata = json!({
        "type": "Metadata",
        "request_id": format!("req-{conn_id}"),
        "models": ["nova-2"],
    });
    write.send(Message::Text(metadata.to_string().into())).await?;

    let mut frames = 0u64;
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Binary(_audio) => {
                frames += 1;
                state.audio_frames.fetch_add(1, Ordering::Relaxed);

                if let Some(text) = state.transcripts.get(frames as usize - 1) {
                    write.send(results(text, false)).await?;
                    write.send(results(text, true)).await?;
                }
                if state.close_after_frames == Some(frames) {
                    write.send(Message::Close(None)).await?;
                    break;
                }
            }
            Message::Text(text) => {
                let control: Value = serde_json::from_str(&text)?;
                match control.get("type").and_then(|t| t.as_str()) {
                    Some("CloseStream") => {
                        state.close_streams.fetch_add(1, Ordering::Relaxed);
                        write.send(Message::Close(None)).await?;
                        break;
                    }
                    Some("KeepAlive") => {
                        state.keepalives.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
            }
            Message::Ping(data) => write.send(Message::Pong(data)).await?,
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

/// Starts the mock on an ephemeral port and returns its address.
pub async fn spawn_deepgram_live_mock(
    state: Arc<DeepgramLiveMockState>,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, state).await {
                    eprintln!("Deepgram mock connection error: {}", e);
                }
            });
        }
    });
    (addr, handle)
}
