//! Operational surface for voice calls.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::billing::BillingMeter;
use crate::core::llm::{PersonalityBuilder, ResponseGenerator};
use crate::core::providers::Providers;
use crate::core::session::{
    CallProfile, ConversationStats, EndReason, Session, SessionError, SessionInfo, SessionKey,
    SessionRegistry, SessionResult, SessionSettings, SessionStatus,
};
use crate::core::store::{BalanceStore, CharacterStore};
use crate::core::transport::EventTransport;

/// Already-authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub username: String,
}

impl CallerIdentity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedCall {
    pub session_key: String,
    pub session_id: uuid::Uuid,
    pub character_name: String,
}

#[derive(Debug, Clone)]
pub struct CallServiceConfig {
    pub session: SessionSettings,
    pub billing_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for CallServiceConfig {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            billing_interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// External collaborators the service talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub characters: Arc<dyn CharacterStore>,
    pub balances: Arc<dyn BalanceStore>,
    pub transport: Arc<dyn EventTransport>,
}

pub struct VoiceCallService {
    registry: SessionRegistry,
    meter: Arc<BillingMeter>,
    collaborators: Collaborators,
    providers: Providers,
    generator: Arc<ResponseGenerator>,
    config: CallServiceConfig,
    ticker: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl VoiceCallService {
    pub fn new(
        collaborators: Collaborators,
        providers: Providers,
        config: CallServiceConfig,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            meter: Arc::new(BillingMeter::new(collaborators.balances.clone())),
            generator: Arc::new(ResponseGenerator::new(providers.llm.clone())),
            collaborators,
            providers,
            config,
            ticker: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Starts a call between `caller` and `character_id`.
    pub async fn start_call(
        &self,
        caller: &CallerIdentity,
        character_id: &str,
    ) -> SessionResult<StartedCall> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::ShuttingDown);
        }
        let key = SessionKey::new(&caller.user_id, character_id);
        if self.registry.contains(&key) {
            return Err(SessionError::AlreadyActive(key.to_string()));
        }

        let character = self
            .collaborators
            .characters
            .lookup_character(character_id)
            .await?
            .ok_or_else(|| SessionError::CharacterNotFound(character_id.to_string()))?;

        let balance = self
            .collaborators
            .balances
            .get_balance(&caller.user_id)
            .await?;
        if balance <= 0 {
            return Err(SessionError::InsufficientFunds { balance });
        }

        let persona = PersonalityBuilder::build(&character.tags);
        debug!(session_key = %key, %persona, "Persona directive");

        let stt = (self.providers.stt)()?;
        let profile = CallProfile {
            user_id: caller.user_id.clone(),
            username: caller.username.clone(),
            character,
            persona,
        };
        let session = Session::new(
            profile,
            self.config.session.clone(),
            stt,
            self.providers.tts.clone(),
            self.generator.clone(),
            self.collaborators.transport.clone(),
        );

        let session = self.registry.start(session).await?;
        if self.cancel.is_cancelled() {
            // shutdown began while the provider was connecting
            let _ = self.registry.end(&key, EndReason::Shutdown).await;
            return Err(SessionError::ShuttingDown);
        }
        self.ensure_ticker();

        Ok(StartedCall {
            session_key: key.to_string(),
            session_id: session.id(),
            character_name: session.profile().character.name.clone(),
        })
    }

    pub async fn end_call(&self, key: &SessionKey) -> SessionResult<ConversationStats> {
        self.registry.end(key, EndReason::Requested).await
    }

    /// Forwards one client audio frame. Returns `false` if there is no live call.
    pub fn send_audio(&self, key: &SessionKey, frame: Bytes) -> bool {
        match self.registry.get(key) {
            Some(session) if session.is_active() => {
                session.send_audio(frame);
                true
            }
            _ => {
                warn!(session_key = %key, "No active voice call, dropping audio frame");
                false
            }
        }
    }

    /// Ends the caller's call after their client went away.
    pub async fn handle_client_disconnect(&self, key: &SessionKey) -> Option<ConversationStats> {
        if !self.registry.contains(key) {
            return None;
        }
        match self.registry.end(key, EndReason::ClientDisconnected).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(session_key = %key, "Disconnect cleanup failed: {}", e);
                None
            }
        }
    }

    pub fn get_status(&self, key: &SessionKey) -> SessionStatus {
        self.registry
            .get(key)
            .map(|session| session.status())
            .unwrap_or(SessionStatus {
                active: false,
                provider_state: None,
            })
    }

    pub async fn list_active_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions = Vec::new();
        for session in self.registry.snapshot() {
            if session.is_active() {
                sessions.push(session.info().await);
            }
        }
        sessions
    }

    pub async fn cleanup_inactive(&self) -> usize {
        self.registry
            .cleanup_inactive(self.config.idle_timeout, Instant::now())
            .await
    }

    /// Runs one billing pass immediately.
    pub async fn bill_now(&self) {
        self.meter.tick(&self.registry, Instant::now()).await;
    }

    /// Stops the ticker and ends every call.
    pub async fn shutdown(&self) {
        info!("Shutting down voice call service");
        self.cancel.cancel();
        let ticker = self.ticker.lock().take();
        if let Some(ticker) = ticker
            && let Err(e) = ticker.await
        {
            warn!("Billing ticker ended abnormally: {}", e);
        }
        self.registry.shutdown_all().await;
    }

    fn ensure_ticker(&self) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() || self.cancel.is_cancelled() {
            return;
        }

        let registry = self.registry.clone();
        let meter = self.meter.clone();
        let cancel = self.cancel.clone();
        let period = self.config.billing_interval;
        let idle_timeout = self.config.idle_timeout;

        info!(?period, "Starting billing ticker");
        // first charge one full period after start
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        *ticker = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let now = Instant::now();
                        meter.tick(&registry, now).await;
                        registry.cleanup_inactive(idle_timeout, now).await;
                    }
                }
            }
            debug!("Billing ticker stopped");
        }));
    }
}
