//! Mock providers and a wired-up call service for integration tests.
//!
//! - [`ScriptedSTT`]: transcription adapter driven from the test
//! - [`ScriptedLLM`]: chat completion with canned replies
//! - [`ScriptedTTS`]: synthesis that echoes the spoken text as audio
//! - [`websocket_mock`]: Deepgram live endpoint over a real socket

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod websocket_mock;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};

use charvoice_gateway::core::llm::{ChatCompletion, ChatMessage, GenerationError, GenerationResult};
use charvoice_gateway::core::store::{Character, InMemoryBalanceStore, StaticCharacterStore};
use charvoice_gateway::core::stt::{
    BaseSTT, STTConnectionState, STTError, STTEvent, STTEventStream, STTResult, TranscriptEvent,
};
use charvoice_gateway::core::transport::{BroadcastTransport, PublishedEvent};
use charvoice_gateway::core::tts::{BaseTTS, ProviderAudio, TTSError, TTSResult};
use charvoice_gateway::core::{
    CallServiceConfig, CallerIdentity, Collaborators, Providers, STTFactory, SessionKey,
    VoiceCallService,
};

pub const USER_ID: &str = "u1";
pub const CHARACTER_ID: &str = "c1";

/// Transcription double. Events are pushed by the test.
pub struct ScriptedSTT {
    state: RwLock<STTConnectionState>,
    events: Mutex<Option<mpsc::Sender<STTEvent>>>,
    open_error: Option<STTError>,
    pub frames: Mutex<Vec<Bytes>>,
    finish_calls: AtomicUsize,
    flush_on_finish: Mutex<Option<String>>,
    finish_delay: Mutex<Option<Duration>>,
}

impl ScriptedSTT {
    pub fn new(open_error: Option<STTError>) -> Self {
        Self {
            state: RwLock::new(STTConnectionState::Closed),
            events: Mutex::new(None),
            open_error,
            frames: Mutex::new(Vec::new()),
            finish_calls: AtomicUsize::new(0),
            flush_on_finish: Mutex::new(None),
            finish_delay: Mutex::new(None),
        }
    }

    /// Makes `finish` take `delay`, like a provider slow to confirm the close.
    pub fn slow_finish(&self, delay: Duration) {
        *self.finish_delay.lock() = Some(delay);
    }

    /// Delivers one last final transcript while the stream is closing.
    pub fn flush_on_finish(&self, text: &str) {
        *self.flush_on_finish.lock() = Some(text.to_string());
    }

    pub async fn push(&self, event: STTEvent) {
        let sender = self.events.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    pub async fn say(&self, text: &str) {
        self.push(STTEvent::Transcript(TranscriptEvent::new(text, true)))
            .await;
    }

    /// Simulates the provider dropping the connection.
    pub async fn close_from_provider(&self) {
        *self.state.write() = STTConnectionState::Closed;
        self.push(STTEvent::Closed).await;
        self.events.lock().take();
    }

    pub fn finish_calls(&self) -> usize {
        self.finish_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseSTT for ScriptedSTT {
    async fn open(&self) -> STTResult<STTEventStream> {
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        let (tx, rx) = mpsc::channel(64);
        *self.events.lock() = Some(tx);
        *self.state.write() = STTConnectionState::Open;
        Ok(rx)
    }

    fn send_audio(&self, frame: Bytes) {
        self.frames.lock().push(frame);
    }

    async fn finish(&self) -> STTResult<()> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        let flushed = self.flush_on_finish.lock().take();
        if let Some(text) = flushed {
            self.say(&text).await;
            // let the session drain the flushed result before the stream ends
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let delay = *self.finish_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().take();
        *self.state.write() = STTConnectionState::Closed;
        Ok(())
    }

    fn state(&self) -> STTConnectionState {
        *self.state.read()
    }

    fn provider_info(&self) -> &'static str {
        "Scripted STT"
    }
}

/// Chat completion double. Replies are served in order; the last one repeats.
pub struct ScriptedLLM {
    replies: Mutex<VecDeque<GenerationResult<String>>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    calls: AtomicUsize,
}

impl ScriptedLLM {
    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Err(GenerationError::Timeout(
                Duration::from_secs(10),
            ))])),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatCompletion for ScriptedLLM {
    async fn complete(&self, messages: &[ChatMessage]) -> GenerationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(messages.to_vec());
        let mut replies = self.replies.lock();
        if replies.len() > 1 {
            replies.pop_front().unwrap_or_else(|| Ok(String::new()))
        } else {
            replies
                .front()
                .cloned()
                .unwrap_or_else(|| Ok("Hello.".to_string()))
        }
    }

    fn provider_info(&self) -> &'static str {
        "Scripted LLM"
    }
}

/// Synthesis double. The audio is the spoken text's bytes.
#[derive(Default)]
pub struct ScriptedTTS {
    pub spoken: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait]
impl BaseTTS for ScriptedTTS {
    async fn request_audio(&self, text: &str) -> TTSResult<ProviderAudio> {
        self.spoken.lock().push(text.to_string());
        if self.fail {
            return Err(TTSError::ProviderError {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(ProviderAudio::Buffer(Bytes::from(text.to_string())))
    }

    fn provider_info(&self) -> &'static str {
        "Scripted TTS"
    }
}

/// A service wired to scripted providers and in-memory stores.
pub struct Harness {
    pub service: VoiceCallService,
    pub llm: Arc<ScriptedLLM>,
    pub tts: Arc<ScriptedTTS>,
    pub balances: Arc<InMemoryBalanceStore>,
    pub transport: Arc<BroadcastTransport>,
    adapters: Arc<Mutex<Vec<Arc<ScriptedSTT>>>>,
    next_open_error: Arc<Mutex<Option<STTError>>>,
}

pub struct HarnessBuilder {
    balance: i64,
    llm: Arc<ScriptedLLM>,
    tts: ScriptedTTS,
    config: CallServiceConfig,
    tags: Vec<String>,
}

impl HarnessBuilder {
    pub fn balance(mut self, coins: i64) -> Self {
        self.balance = coins;
        self
    }

    pub fn llm(mut self, llm: Arc<ScriptedLLM>) -> Self {
        self.llm = llm;
        self
    }

    pub fn failing_tts(mut self) -> Self {
        self.tts.fail = true;
        self
    }

    pub fn config(mut self, config: CallServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Harness {
        let adapters: Arc<Mutex<Vec<Arc<ScriptedSTT>>>> = Arc::new(Mutex::new(Vec::new()));
        let next_open_error: Arc<Mutex<Option<STTError>>> = Arc::new(Mutex::new(None));

        let stt: STTFactory = {
            let adapters = adapters.clone();
            let next_open_error = next_open_error.clone();
            Arc::new(move || {
                let adapter = Arc::new(ScriptedSTT::new(next_open_error.lock().take()));
                adapters.lock().push(adapter.clone());
                let adapter: Arc<dyn BaseSTT> = adapter;
                Ok(adapter)
            })
        };

        let tts = Arc::new(self.tts);
        let balances = Arc::new(InMemoryBalanceStore::new().with_balance(USER_ID, self.balance));
        let transport = Arc::new(BroadcastTransport::default());
        let characters = StaticCharacterStore::new().with_character(Character {
            id: CHARACTER_ID.to_string(),
            name: "Luna".to_string(),
            description: Some("A moonlit wanderer".to_string()),
            tags: self.tags,
        });

        let service = VoiceCallService::new(
            Collaborators {
                characters: Arc::new(characters),
                balances: balances.clone(),
                transport: transport.clone(),
            },
            Providers::new(stt, tts.clone(), self.llm.clone()),
            self.config,
        );

        Harness {
            service,
            llm: self.llm,
            tts,
            balances,
            transport,
            adapters,
            next_open_error,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            balance: 100,
            llm: ScriptedLLM::replying(&["Hello there."]),
            tts: ScriptedTTS::default(),
            config: quiet_config(),
            tags: vec!["shy".to_string(), "elf".to_string()],
        }
    }

    pub fn caller() -> CallerIdentity {
        CallerIdentity::new(USER_ID, "Alex")
    }

    pub fn key() -> SessionKey {
        SessionKey::new(USER_ID, CHARACTER_ID)
    }

    /// Most recently created transcription adapter.
    pub fn stt(&self) -> Arc<ScriptedSTT> {
        self.adapters
            .lock()
            .last()
            .cloned()
            .expect("no transcription adapter created yet")
    }

    pub fn adapters_created(&self) -> usize {
        self.adapters.lock().len()
    }

    pub fn fail_next_open(&self, error: STTError) {
        *self.next_open_error.lock() = Some(error);
    }

    pub fn events(&self) -> broadcast::Receiver<PublishedEvent> {
        self.transport.subscribe()
    }
}

/// Service settings that keep the background ticker out of the way.
pub fn quiet_config() -> CallServiceConfig {
    CallServiceConfig {
        billing_interval: Duration::from_secs(3600),
        idle_timeout: Duration::from_secs(300),
        ..CallServiceConfig::default()
    }
}

/// Waits for the next published event named `name`.
pub async fn next_event(events: &mut broadcast::Receiver<PublishedEvent>, name: &str) -> PublishedEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if event.event == name => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("transport closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}

/// Drains every event published so far.
pub fn drain(events: &mut broadcast::Receiver<PublishedEvent>) -> Vec<PublishedEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
