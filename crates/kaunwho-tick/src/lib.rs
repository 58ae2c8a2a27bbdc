//! Fixed-period poll scheduler for the KaunWho controller.
//!
//! The controller drains the transport inbox on a fixed period instead of
//! reacting to a callback. This crate owns that cadence: how often to
//! wake up, what to do when a wake-up comes late, and how long each drain
//! took.
//!
//! # Disabled mode
//!
//! When `interval_ms` is 0 the scheduler is disabled and
//! [`PollScheduler::wait_for_poll`] pends forever. A controller driven
//! purely by commands (tests, for instance) can use this.
//!
//! # Integration
//!
//! The scheduler sits inside the controller actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle command */ }
//!         _ = poll.wait_for_poll() => {
//!             manager.poll_inbox();
//!             poll.record_dispatch_end();
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the poll scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Period between inbox drains in milliseconds. 0 disables polling.
    pub interval_ms: u64,
    /// A dispatch taking longer than this many milliseconds is logged.
    pub slow_dispatch_ms: u64,
    /// Random delay (0–max µs) added to the first poll.
    pub initial_jitter_us: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            slow_dispatch_ms: 50,
            initial_jitter_us: 1_000,
        }
    }
}

impl PollConfig {
    /// Shortest accepted period. Anything smaller is raised to this.
    pub const MIN_INTERVAL_MS: u64 = 5;

    pub fn with_interval(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            ..Default::default()
        }
    }

    /// Raises a non-zero `interval_ms` below [`Self::MIN_INTERVAL_MS`].
    pub fn validated(mut self) -> Self {
        if self.interval_ms != 0 && self.interval_ms < Self::MIN_INTERVAL_MS {
            warn!(
                interval_ms = self.interval_ms,
                min = Self::MIN_INTERVAL_MS,
                "poll interval too small, raising"
            );
            self.interval_ms = Self::MIN_INTERVAL_MS;
        }
        self
    }

    /// The poll period, or `None` when disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

// ---------------------------------------------------------------------------
// Poll info and metrics
// ---------------------------------------------------------------------------

/// Returned by [`PollScheduler::wait_for_poll`] each time it fires.
#[derive(Debug, Clone)]
pub struct PollInfo {
    /// Poll number, starting at 1.
    pub poll: u64,
    /// The wake-up was more than a tenth of a period late.
    pub overrun: bool,
    /// Whole periods skipped because of the late wake-up.
    pub polls_skipped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PollMetrics {
    pub total_polls: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    pub slow_dispatches: u64,
    /// Exponential moving average of dispatch time (α = 0.1).
    pub avg_dispatch_time: Duration,
    pub max_dispatch_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Drives the controller's inbox drain on a fixed period.
pub struct PollScheduler {
    config: PollConfig,
    interval: Option<Duration>,
    poll_count: u64,
    next_poll: Option<Instant>,
    dispatch_start: Option<Instant>,
    paused: bool,
    metrics: PollMetrics,
}

impl PollScheduler {
    pub fn new(config: PollConfig) -> Self {
        let config = config.validated();
        let interval = config.interval();

        let next_poll = interval.map(|period| {
            let jitter = match config.initial_jitter_us {
                0 => Duration::ZERO,
                max => Duration::from_micros(rand::rng().random_range(0..max)),
            };
            Instant::now() + period + jitter
        });

        match interval {
            Some(period) => debug!(
                interval_ms = period.as_millis() as u64,
                "poll scheduler created"
            ),
            None => debug!("poll scheduler created disabled"),
        }

        Self {
            config,
            interval,
            poll_count: 0,
            next_poll,
            dispatch_start: None,
            paused: false,
            metrics: PollMetrics::default(),
        }
    }

    /// Waits until the next poll is due.
    ///
    /// Pends forever when disabled or paused, so it is safe to use as a
    /// `select!` branch in either case.
    pub async fn wait_for_poll(&mut self) -> PollInfo {
        let (due, period) = match (self.next_poll, self.interval) {
            (Some(due), Some(period)) if !self.paused => (due, period),
            _ => return std::future::pending().await,
        };

        time::sleep_until(due).await;

        let now = Instant::now();
        self.poll_count += 1;
        self.dispatch_start = Some(now);

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > period / 10;
        let mut polls_skipped = 0;

        // A late wake-up forgets the missed polls and restarts the period
        // from now.
        if overrun {
            polls_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
            if polls_skipped > 0 {
                warn!(
                    poll = self.poll_count,
                    skipped = polls_skipped,
                    late_ms = late_by.as_millis() as u64,
                    "poll overrun, skipping ahead"
                );
            }
        }
        self.next_poll = Some(now + period);

        self.metrics.total_polls += 1;
        self.metrics.total_skipped += polls_skipped;
        if overrun {
            self.metrics.total_overruns += 1;
        }

        trace!(poll = self.poll_count, overrun, "poll fired");

        PollInfo {
            poll: self.poll_count,
            overrun,
            polls_skipped,
        }
    }

    /// Records that the dispatch for the current poll finished.
    ///
    /// No-op unless a poll fired since the last call.
    pub fn record_dispatch_end(&mut self) {
        let Some(start) = self.dispatch_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        if elapsed >= Duration::from_millis(self.config.slow_dispatch_ms) {
            self.metrics.slow_dispatches += 1;
            warn!(
                poll = self.poll_count,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow inbox dispatch"
            );
        }

        self.metrics.max_dispatch_time = self.metrics.max_dispatch_time.max(elapsed);
        let prev = self.metrics.avg_dispatch_time.as_secs_f64();
        self.metrics.avg_dispatch_time =
            Duration::from_secs_f64(prev * 0.9 + elapsed.as_secs_f64() * 0.1);
    }

    /// Stops polling until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(poll = self.poll_count, "poll scheduler paused");
        }
    }

    /// Resumes polling one full period from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(period) = self.interval {
                self.next_poll = Some(Instant::now() + period);
            }
            debug!(poll = self.poll_count, "poll scheduler resumed");
        }
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    pub fn metrics(&self) -> &PollMetrics {
        &self.metrics
    }
}
