use std::time::Duration;

use tokio::time::Instant;

/// Per-session billing state.
#[derive(Debug, Clone)]
pub struct BillingTracker {
    pub user_id: String,
    pub character_id: String,
    pub start_time: Instant,
    /// Advanced only by whole seconds, so fractions carry into the next tick.
    pub last_update_time: Instant,
    /// Billed seconds. Never decreases.
    pub total_seconds: u64,
    pub is_active: bool,
}

impl BillingTracker {
    pub fn start(user_id: impl Into<String>, character_id: impl Into<String>, now: Instant) -> Self {
        Self {
            user_id: user_id.into(),
            character_id: character_id.into(),
            start_time: now,
            last_update_time: now,
            total_seconds: 0,
            is_active: true,
        }
    }

    pub fn elapsed_whole_seconds(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.last_update_time).as_secs()
    }

    /// Records `billed` seconds and moves the clock forward by `elapsed`.
    pub fn record(&mut self, elapsed: u64, billed: u64) {
        self.last_update_time += Duration::from_secs(elapsed);
        self.total_seconds += billed;
    }

    pub fn stop(&mut self) {
        self.is_active = false;
    }

    pub fn duration(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractions_carry_over() {
        let t0 = Instant::now();
        let mut tracker = BillingTracker::start("u1", "c1", t0);

        let now = t0 + Duration::from_millis(1700);
        assert_eq!(tracker.elapsed_whole_seconds(now), 1);
        tracker.record(1, 1);

        let now = t0 + Duration::from_millis(2300);
        assert_eq!(tracker.elapsed_whole_seconds(now), 1);
        assert_eq!(tracker.total_seconds, 1);
    }

    #[test]
    fn test_stop() {
        let mut tracker = BillingTracker::start("u1", "c1", Instant::now());
        assert!(tracker.is_active);
        tracker.stop();
        assert!(!tracker.is_active);
    }
}
