//! Photo-selection countdown.
//!
//! Purely informational: expiry deactivates the countdown but never moves
//! the session to another state. Time is passed in explicitly so the
//! countdown works with any clock.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SelectionCountdown {
    duration: Duration,
    started_at: Option<Instant>,
}

impl SelectionCountdown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: None,
        }
    }

    /// (Re)starts the countdown at `now`.
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    pub fn stop(&mut self) {
        self.started_at = None;
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Time left at `now`. Zero when stopped or expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(start) => self
                .duration
                .saturating_sub(now.saturating_duration_since(start)),
            None => Duration::ZERO,
        }
    }

    /// Started and not yet expired.
    pub fn is_active(&self, now: Instant) -> bool {
        !self.remaining(now).is_zero()
    }

    /// Whole seconds left, rounding a partial second up so a fresh
    /// 60-second countdown reads 60 and the last moment reads 1.
    pub fn secs_left(&self, now: Instant) -> u64 {
        let remaining = self.remaining(now);
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    /// Remaining time as `m:ss`.
    pub fn display(&self, now: Instant) -> String {
        let secs = self.secs_left(now);
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}
