//! Failed-verification tracking and lockout.
//!
//! Each identifier moves through three states:
//!
//! - **Clear:** no record.
//! - **Accumulating:** `1..threshold` failures, verification still allowed.
//! - **Locked:** the threshold was reached and `locked_until` is in the future.
//!   Both code requests and verifications are refused.
//!
//! A lapsed lockout returns the identifier to service without clearing the
//! counter, so the next failure locks it again straight away. Only a
//! successful verification resets the record.

use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::clock::Clock;

#[derive(Clone, Debug, Default)]
struct AttemptRecord {
    attempts: u32,
    last_attempt_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

/// Result of recording a failed verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptState {
    Accumulating { attempts: u32 },
    Locked { remaining: StdDuration },
}

pub struct LoginAttemptTracker {
    records: Mutex<HashMap<String, AttemptRecord>>,
    threshold: u32,
    lockout: Duration,
    clock: Arc<dyn Clock>,
}

/// Exclusive access to the attempt map, held across a whole verification.
pub struct AttemptsGuard<'a> {
    records: MutexGuard<'a, HashMap<String, AttemptRecord>>,
    tracker: &'a LoginAttemptTracker,
}

impl LoginAttemptTracker {
    #[must_use]
    pub fn new(threshold: u32, lockout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            threshold: threshold.max(1),
            lockout,
            clock,
        }
    }

    pub async fn lock(&self) -> AttemptsGuard<'_> {
        AttemptsGuard {
            records: self.records.lock().await,
            tracker: self,
        }
    }

    /// Remaining lockout for `identifier`, if it is locked.
    pub async fn check_lockout(&self, identifier: &str) -> Option<StdDuration> {
        self.lock().await.check_lockout(identifier)
    }

    pub async fn record_failure(&self, identifier: &str) -> AttemptState {
        self.lock().await.record_failure(identifier)
    }

    pub async fn reset(&self, identifier: &str) {
        self.lock().await.reset(identifier);
    }
}

impl AttemptsGuard<'_> {
    pub fn check_lockout(&self, identifier: &str) -> Option<StdDuration> {
        let now = self.tracker.clock.now();
        let locked_until = self.records.get(identifier)?.locked_until?;
        if locked_until > now {
            Some(to_std(locked_until - now))
        } else {
            None
        }
    }

    pub fn record_failure(&mut self, identifier: &str) -> AttemptState {
        let now = self.tracker.clock.now();
        let record = self.records.entry(identifier.to_string()).or_default();
        record.attempts = record.attempts.saturating_add(1);
        record.last_attempt_at = Some(now);

        if record.attempts >= self.tracker.threshold {
            let locked_until = now
                .checked_add_signed(self.tracker.lockout)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            record.locked_until = Some(locked_until);
            warn!(
                attempts = record.attempts,
                last_attempt_at = ?record.last_attempt_at,
                %locked_until,
                "login locked after repeated failures"
            );
            AttemptState::Locked {
                remaining: to_std(locked_until - now),
            }
        } else {
            AttemptState::Accumulating {
                attempts: record.attempts,
            }
        }
    }

    pub fn reset(&mut self, identifier: &str) {
        self.records.remove(identifier);
    }
}

fn to_std(delta: Duration) -> StdDuration {
    delta.to_std().unwrap_or(StdDuration::ZERO)
}

/// Render a remaining lockout as minutes and seconds, rounded up.
#[must_use]
pub fn format_remaining(remaining: &StdDuration) -> String {
    let mut secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs += 1;
    }
    match (secs / 60, secs % 60) {
        (0, s) => format!("{s}s"),
        (m, 0) => format!("{m}m"),
        (m, s) => format!("{m}m{s}s"),
    }
}
