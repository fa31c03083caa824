//! One live call between a user and a character.
//!
//! ```text
//! Starting ──▶ Active ──▶ Ending ──▶ Ended
//!     │                                ▲
//!     └────────(open failed)───────────┘
//! ```
//!
//! While active, two tasks run per session: the transcription event loop
//! and a reply worker that generates and synthesizes replies in order, off
//! the audio path. Every termination path goes through [`Session::shutdown`].

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{OnceCell, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{SessionError, SessionResult};
use super::events::{ConversationStats, EndReason, EventBus, SessionEvent};
use super::registry::SessionRegistry;
use crate::core::billing::BillingTracker;
use crate::core::llm::{PromptContext, ResponseGenerator};
use crate::core::memory::{ConversationMemory, DEFAULT_MEMORY_CAP};
use crate::core::store::Character;
use crate::core::stt::{BaseSTT, STTConnectionState, STTEvent, STTEventStream, now_millis};
use crate::core::transport::EventTransport;
use crate::core::tts::{BaseTTS, clean_for_speech};
use crate::core::turn::{DEFAULT_DEDUPE_WINDOW, TurnCoordinator};

/// Identity of a call: one per user and character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub user_id: String,
    pub character_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            character_id: character_id.into(),
        }
    }
}

/// `-` and `%` inside an id are percent-escaped so distinct pairs never
/// render to the same key.
fn escape_key_part(part: &str) -> Cow<'_, str> {
    if !part.contains(['-', '%']) {
        return Cow::Borrowed(part);
    }
    let mut escaped = String::with_capacity(part.len() + 4);
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '-' => escaped.push_str("%2D"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            escape_key_part(&self.user_id),
            escape_key_part(&self.character_id)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Active,
    Ending,
    Ended,
}

/// Who is on the call and the persona the character plays.
#[derive(Debug, Clone)]
pub struct CallProfile {
    pub user_id: String,
    pub username: String,
    pub character: Character,
    /// Directive built from the character's tags at call start.
    pub persona: String,
}

impl CallProfile {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.user_id, &self.character.id)
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub memory_cap: usize,
    pub dedupe_window: Duration,
    pub word_budget: u32,
    /// Admitted utterances waiting for a reply. Overflow is dropped.
    pub reply_queue: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            memory_cap: DEFAULT_MEMORY_CAP,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
            word_budget: crate::core::llm::DEFAULT_WORD_BUDGET,
            reply_queue: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub active: bool,
    pub provider_state: Option<STTConnectionState>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub session_key: String,
    pub user_id: String,
    pub username: String,
    pub character_id: String,
    pub character_name: String,
    pub state: SessionState,
    pub provider_state: STTConnectionState,
    /// Seconds since the call became active.
    pub conversation_time: u64,
    pub billed_seconds: u64,
    pub coins_spent: u64,
}

pub struct Session {
    id: Uuid,
    key: SessionKey,
    profile: CallProfile,
    settings: SessionSettings,
    state: RwLock<SessionState>,
    stt: Arc<dyn BaseSTT>,
    tts: Arc<dyn BaseTTS>,
    generator: Arc<ResponseGenerator>,
    memory: Mutex<ConversationMemory>,
    turns: Mutex<TurnCoordinator>,
    billing: tokio::sync::Mutex<BillingTracker>,
    bus: EventBus,
    active_since: Mutex<Instant>,
    last_activity: Mutex<Instant>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    final_stats: OnceCell<ConversationStats>,
}

impl Session {
    pub fn new(
        profile: CallProfile,
        settings: SessionSettings,
        stt: Arc<dyn BaseSTT>,
        tts: Arc<dyn BaseTTS>,
        generator: Arc<ResponseGenerator>,
        transport: Arc<dyn EventTransport>,
    ) -> Arc<Self> {
        let key = profile.key();
        let now = Instant::now();
        let mut billing = BillingTracker::start(&profile.user_id, &profile.character.id, now);
        // billing starts once the call is active
        billing.stop();

        Arc::new(Self {
            id: Uuid::new_v4(),
            bus: EventBus::new(key.clone(), transport),
            key,
            memory: Mutex::new(ConversationMemory::new(settings.memory_cap)),
            turns: Mutex::new(TurnCoordinator::new(settings.dedupe_window)),
            billing: tokio::sync::Mutex::new(billing),
            profile,
            settings,
            state: RwLock::new(SessionState::Starting),
            stt,
            tts,
            generator,
            active_since: Mutex::new(now),
            last_activity: Mutex::new(now),
            tasks: Mutex::new(Vec::new()),
            final_stats: OnceCell::new(),
        })
    }

    /// Opens transcription and starts the session tasks.
    ///
    /// On failure the session goes straight to `Ended`.
    pub(crate) async fn open(self: &Arc<Self>, registry: SessionRegistry) -> SessionResult<()> {
        info!(session_key = %self.key, provider = self.stt.provider_info(), "Starting voice call");

        let events = match self.stt.open().await {
            Ok(events) => events,
            Err(e) => {
                error!(session_key = %self.key, "Failed to open transcription: {}", e);
                let _ = self.final_stats.set(ConversationStats {
                    duration_seconds: 0,
                    coins_spent: 0,
                    reason: EndReason::ConnectFailed,
                });
                *self.state.write() = SessionState::Ended;
                return Err(SessionError::Transcription(e));
            }
        };

        let now = Instant::now();
        let activated = {
            let mut state = self.state.write();
            if *state == SessionState::Starting {
                *state = SessionState::Active;
                true
            } else {
                false
            }
        };
        if !activated {
            // ended while the provider was still connecting
            let _ = self.stt.finish().await;
            return Err(SessionError::NotFound(self.key.to_string()));
        }

        *self.active_since.lock() = now;
        *self.last_activity.lock() = now;
        *self.billing.lock().await =
            BillingTracker::start(&self.profile.user_id, &self.profile.character.id, now);

        let (reply_tx, reply_rx) = mpsc::channel(self.settings.reply_queue.max(1));
        let worker = tokio::spawn(run_reply_worker(self.clone(), reply_rx));
        let event_loop = tokio::spawn(run_event_loop(self.clone(), events, reply_tx, registry));
        self.tasks.lock().extend([worker, event_loop]);

        info!(session_key = %self.key, session_id = %self.id, "Voice call active");
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn profile(&self) -> &CallProfile {
        &self.profile
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn billing(&self) -> &tokio::sync::Mutex<BillingTracker> {
        &self.billing
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().len()
    }

    pub fn emit(&self, event: SessionEvent) {
        self.bus.emit(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    pub fn call_duration(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.active_since.lock())
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_activity.lock())
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Forwards a client audio frame. Never blocks.
    pub fn send_audio(&self, frame: Bytes) {
        if !self.is_active() {
            warn!(session_key = %self.key, state = ?self.state(), "Dropping audio for inactive call");
            return;
        }
        self.touch();
        self.stt.send_audio(frame);
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            active: self.is_active(),
            provider_state: Some(self.stt.state()),
        }
    }

    pub async fn info(&self) -> SessionInfo {
        let billed_seconds = self.billing.lock().await.total_seconds;
        SessionInfo {
            session_id: self.id,
            session_key: self.key.to_string(),
            user_id: self.profile.user_id.clone(),
            username: self.profile.username.clone(),
            character_id: self.profile.character.id.clone(),
            character_name: self.profile.character.name.clone(),
            state: self.state(),
            provider_state: self.stt.state(),
            conversation_time: self.call_duration(Instant::now()).as_secs(),
            billed_seconds,
            coins_spent: billed_seconds,
        }
    }

    /// Ends the call. Idempotent: later calls return the first call's stats.
    pub async fn shutdown(&self, reason: EndReason) -> ConversationStats {
        self.final_stats
            .get_or_init(|| self.teardown(reason))
            .await
            .clone()
    }

    pub fn final_stats(&self) -> Option<ConversationStats> {
        self.final_stats.get().cloned()
    }

    async fn teardown(&self, reason: EndReason) -> ConversationStats {
        *self.state.write() = SessionState::Ending;
        info!(session_key = %self.key, %reason, "Ending voice call");

        let now = Instant::now();
        let coins_spent = {
            let mut billing = self.billing.lock().await;
            billing.stop();
            billing.total_seconds
        };
        let duration_seconds = self.call_duration(now).as_secs();

        if let Err(e) = self.stt.finish().await {
            warn!(session_key = %self.key, "Transcription close failed: {}", e);
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        self.memory.lock().clear();

        let stats = ConversationStats {
            duration_seconds,
            coins_spent,
            reason,
        };
        self.bus.emit(SessionEvent::CallEnded(stats.clone()));
        *self.state.write() = SessionState::Ended;

        info!(
            session_key = %self.key,
            duration_seconds,
            coins_spent,
            "Voice call ended"
        );
        stats
    }

    fn prompt_context(&self) -> PromptContext<'_> {
        PromptContext {
            character_name: &self.profile.character.name,
            speaker_name: &self.profile.username,
            persona: &self.profile.persona,
            background: self.profile.character.description.as_deref(),
            word_budget: self.settings.word_budget,
        }
    }

    /// Generates, speaks and publishes one reply.
    async fn respond(&self, utterance: &str) {
        let reply = self
            .generator
            .generate(utterance, &self.prompt_context(), &self.memory)
            .await;
        if !self.is_active() {
            return;
        }

        let character = &self.profile.character;
        self.bus.emit(SessionEvent::AiResponse {
            character_id: character.id.clone(),
            character_name: character.name.clone(),
            text: reply.text.clone(),
            timestamp: now_millis(),
        });

        let spoken = clean_for_speech(&reply.text);
        debug!(session_key = %self.key, "Synthesizing: {}", spoken);
        match self.tts.synthesize(&spoken).await {
            Ok(audio) => {
                if !self.is_active() {
                    return;
                }
                self.bus.emit(SessionEvent::AudioGenerated {
                    character_id: character.id.clone(),
                    character_name: character.name.clone(),
                    audio,
                    text: spoken,
                    timestamp: now_millis(),
                });
            }
            Err(e) => {
                error!(session_key = %self.key, provider = self.tts.provider_info(), "Speech synthesis failed: {}", e);
                self.bus.emit(SessionEvent::Error {
                    message: format!("Speech synthesis failed: {e}"),
                    timestamp: now_millis(),
                });
            }
        }
    }

    fn handle_transcript(&self, text: String, is_final: bool, timestamp: u64, replies: &mpsc::Sender<String>) {
        self.bus.emit(SessionEvent::Transcript {
            user_id: self.profile.user_id.clone(),
            username: self.profile.username.clone(),
            text: text.clone(),
            is_final,
            timestamp,
        });
        // late finals flushed during close get no reply
        if !is_final || !self.is_active() {
            return;
        }

        let admitted = self
            .turns
            .lock()
            .admit(&self.profile.user_id, &text, Instant::now());
        if !admitted {
            return;
        }
        info!(session_key = %self.key, "{}: {}", self.profile.username, text);
        if let Err(e) = replies.try_send(text) {
            warn!(session_key = %self.key, "Reply queue unavailable, dropping utterance: {}", e);
        }
    }
}

async fn run_event_loop(
    session: Arc<Session>,
    mut events: STTEventStream,
    replies: mpsc::Sender<String>,
    registry: SessionRegistry,
) {
    while let Some(event) = events.recv().await {
        session.touch();
        match event {
            STTEvent::Transcript(t) => {
                session.handle_transcript(t.text, t.is_final, t.timestamp, &replies)
            }
            STTEvent::SpeechStarted => session.emit(SessionEvent::SpeechStarted),
            STTEvent::UtteranceEnd => session.emit(SessionEvent::UtteranceEnd),
            STTEvent::Error(e) => {
                error!(session_key = %session.key, "Transcription error: {}", e);
                session.emit(SessionEvent::Error {
                    message: e.to_string(),
                    timestamp: now_millis(),
                });
            }
            STTEvent::Closed => break,
        }
    }

    if session.is_active() {
        info!(session_key = %session.key, "Transcription connection closed by provider");
        session.emit(SessionEvent::ConnectionClosed);
        let key = session.key.clone();
        // shutdown aborts this task, so end from outside it
        tokio::spawn(async move {
            if let Err(e) = registry.end(&key, EndReason::ProviderClosed).await {
                debug!(session_key = %key, "Provider-close cleanup: {}", e);
            }
        });
    }
}

async fn run_reply_worker(session: Arc<Session>, mut utterances: mpsc::Receiver<String>) {
    while let Some(utterance) = utterances.recv().await {
        session.respond(&utterance).await;
    }
}
