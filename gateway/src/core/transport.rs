//! Outbound event delivery. The core only names events; how they reach a
//! client is up to the transport.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::core::session::SessionKey;

pub trait EventTransport: Send + Sync {
    fn publish(&self, session_key: &SessionKey, event: &str, payload: Value);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedEvent {
    pub session_key: String,
    pub event: String,
    pub payload: Value,
}

/// Fans published events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastTransport {
    tx: broadcast::Sender<PublishedEvent>,
}

impl BroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventTransport for BroadcastTransport {
    fn publish(&self, session_key: &SessionKey, event: &str, payload: Value) {
        let published = PublishedEvent {
            session_key: session_key.to_string(),
            event: event.to_string(),
            payload,
        };
        if self.tx.send(published).is_err() {
            trace!(%session_key, event, "No subscribers for event");
        }
    }
}

/// Logs events and drops them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTransport;

impl EventTransport for TracingTransport {
    fn publish(&self, session_key: &SessionKey, event: &str, payload: Value) {
        debug!(%session_key, event, %payload, "Session event");
    }
}
