//! Second-granularity coin metering.
//!
//! One ticker per process calls [`BillingMeter::tick`]. Sessions are settled
//! one after another so two debits for the same user never interleave.

use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::tracker::BillingTracker;
use crate::core::session::{EndReason, SessionEvent, SessionRegistry, SessionState};
use crate::core::store::{BalanceStore, StoreError};

pub const INSUFFICIENT_FUNDS_MESSAGE: &str = "Voice call ended due to insufficient coins";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BillingError {
    #[error("Balance store failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingOutcome {
    /// Inactive tracker, or less than a whole second elapsed.
    NoChange,
    Charged { debited: u64, balance: i64 },
    /// The balance hit zero. The session must end.
    Exhausted { debited: u64, total_seconds: u64 },
}

pub struct BillingMeter {
    balances: Arc<dyn BalanceStore>,
}

impl BillingMeter {
    pub fn new(balances: Arc<dyn BalanceStore>) -> Self {
        Self { balances }
    }

    /// Bills the whole seconds elapsed since the tracker's last update.
    ///
    /// Debits `min(elapsed, balance)` so the balance never goes negative.
    /// The tracker lock is held across the store calls.
    pub async fn settle(
        &self,
        tracker: &Mutex<BillingTracker>,
        now: Instant,
    ) -> Result<BillingOutcome, BillingError> {
        let mut tracker = tracker.lock().await;
        if !tracker.is_active {
            return Ok(BillingOutcome::NoChange);
        }
        let elapsed = tracker.elapsed_whole_seconds(now);
        if elapsed == 0 {
            return Ok(BillingOutcome::NoChange);
        }

        let balance = self.balances.get_balance(&tracker.user_id).await?;
        let billable = i64::try_from(elapsed).unwrap_or(i64::MAX).min(balance.max(0));
        let new_balance = if billable > 0 {
            self.balances.debit(&tracker.user_id, billable).await?
        } else {
            balance
        };
        let debited = billable as u64;
        tracker.record(elapsed, debited);

        debug!(
            user_id = %tracker.user_id,
            character_id = %tracker.character_id,
            elapsed,
            debited,
            balance = new_balance,
            "Billing tick"
        );

        if new_balance <= 0 {
            tracker.stop();
            Ok(BillingOutcome::Exhausted {
                debited,
                total_seconds: tracker.total_seconds,
            })
        } else {
            Ok(BillingOutcome::Charged {
                debited,
                balance: new_balance,
            })
        }
    }

    /// Settles every active session and ends those that ran out of coins.
    ///
    /// Debits run one session at a time. Exhausted sessions are then ended
    /// together so one slow provider close does not hold up the rest.
    pub async fn tick(&self, registry: &SessionRegistry, now: Instant) {
        let mut exhausted = Vec::new();
        for session in registry.snapshot() {
            if session.state() != SessionState::Active {
                continue;
            }
            match self.settle(session.billing(), now).await {
                Ok(BillingOutcome::Exhausted { total_seconds, .. }) => {
                    info!(session_key = %session.key(), total_seconds, "Ending call: insufficient coins");
                    session.emit(SessionEvent::InsufficientFunds {
                        message: INSUFFICIENT_FUNDS_MESSAGE.to_string(),
                        coins_spent: total_seconds,
                        duration: session.call_duration(now).as_secs(),
                    });
                    exhausted.push(session.key().clone());
                }
                Ok(_) => {}
                Err(e) => {
                    error!(session_key = %session.key(), "Billing failed: {}", e);
                }
            }
        }

        let endings = exhausted.iter().map(|key| async move {
            if let Err(e) = registry.end(key, EndReason::InsufficientFunds).await {
                error!(session_key = %key, "Failed to end exhausted session: {}", e);
            }
        });
        join_all(endings).await;
    }
}
