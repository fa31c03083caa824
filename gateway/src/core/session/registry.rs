//! Owner of all live sessions.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use moka::sync::Cache;
use tokio::time::Instant;
use tracing::{info, warn};

use super::error::{SessionError, SessionResult};
use super::events::{ConversationStats, EndReason};
use super::session::{Session, SessionKey};

/// How long stats of an ended call stay available to repeated `end` calls.
const ENDED_STATS_TTL: Duration = Duration::from_secs(300);
const ENDED_STATS_CAPACITY: u64 = 10_000;

/// At most one session per [`SessionKey`]. Cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionKey, Arc<Session>>>,
    ended: Cache<SessionKey, ConversationStats>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ended: Cache::builder()
                .max_capacity(ENDED_STATS_CAPACITY)
                .time_to_live(ENDED_STATS_TTL)
                .build(),
        }
    }

    /// Reserves the session's key and opens it.
    ///
    /// Fails with [`SessionError::AlreadyActive`] without touching the
    /// existing session. If opening fails the key is released.
    pub async fn start(&self, session: Arc<Session>) -> SessionResult<Arc<Session>> {
        let key = session.key().clone();
        match self.sessions.entry(key.clone()) {
            Entry::Occupied(_) => return Err(SessionError::AlreadyActive(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }

        if let Err(e) = session.open(self.clone()).await {
            self.release(&session);
            return Err(e);
        }
        Ok(session)
    }

    /// Ends the session for `key` and releases the key once teardown is done.
    ///
    /// Repeated calls return the stats of the first; unknown keys are
    /// [`SessionError::NotFound`].
    pub async fn end(&self, key: &SessionKey, reason: EndReason) -> SessionResult<ConversationStats> {
        let Some(session) = self.get(key) else {
            return self
                .ended
                .get(key)
                .ok_or_else(|| SessionError::NotFound(key.to_string()));
        };

        let stats = session.shutdown(reason).await;
        self.ended.insert(key.clone(), stats.clone());
        self.release(&session);
        Ok(stats)
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Point-in-time list of tracked sessions.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Ends sessions with no audio or provider activity for `idle_timeout`.
    pub async fn cleanup_inactive(&self, idle_timeout: Duration, now: Instant) -> usize {
        let idle: Vec<SessionKey> = self
            .snapshot()
            .into_iter()
            .filter(|s| s.is_active() && s.idle_for(now) >= idle_timeout)
            .map(|s| s.key().clone())
            .collect();

        let mut ended = 0;
        for key in idle {
            info!(session_key = %key, "Ending idle voice call");
            match self.end(&key, EndReason::Idle).await {
                Ok(_) => ended += 1,
                Err(e) => warn!(session_key = %key, "Idle cleanup failed: {}", e),
            }
        }
        ended
    }

    /// Ends every tracked session and waits for all teardowns.
    pub async fn shutdown_all(&self) {
        let keys: Vec<SessionKey> = self.sessions.iter().map(|e| e.key().clone()).collect();
        if keys.is_empty() {
            return;
        }
        info!(count = keys.len(), "Shutting down all voice calls");
        let results = join_all(keys.iter().map(|key| self.end(key, EndReason::Shutdown))).await;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                warn!(session_key = %key, "Shutdown of voice call failed: {}", e);
            }
        }
    }

    /// Removes the entry only if it still belongs to `session`, so a newer
    /// call on the same key is never dropped.
    fn release(&self, session: &Session) {
        let id = session.id();
        self.sessions
            .remove_if(session.key(), |_, current| current.id() == id);
    }
}
