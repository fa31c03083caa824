//! Duplicate suppression for final transcripts.
//!
//! A final transcript is admitted unless the same user said the same
//! normalized text within the dedupe window. Seen keys are pruned lazily on
//! every check.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_millis(2000);

#[derive(Debug)]
pub struct TurnCoordinator {
    window: Duration,
    recent: HashMap<String, Instant>,
}

impl Default for TurnCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUPE_WINDOW)
    }
}

impl TurnCoordinator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            recent: HashMap::new(),
        }
    }

    /// Returns `true` if this transcript should trigger a reply.
    pub fn admit(&mut self, user_id: &str, text: &str, now: Instant) -> bool {
        self.prune(now);

        let normalized = normalize(text);
        if normalized.is_empty() {
            return false;
        }

        let key = format!("{user_id}:{normalized}");
        if self.recent.contains_key(&key) {
            debug!(user_id, "Suppressing duplicate transcript: {}", normalized);
            return false;
        }
        self.recent.insert(key, now);
        true
    }

    pub fn tracked(&self) -> usize {
        self.recent.len()
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.recent
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
    }
}

/// Lowercase, collapse whitespace, strip surrounding punctuation.
pub fn normalize(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}
