//! Start/stop timer keyed to phase transitions

use std::time::Duration;
use tokio::time::Instant;

/// Single-interval stopwatch.
///
/// Only the most recent completed interval is kept; each `stop` overwrites it.
#[derive(Debug, Clone, Default)]
pub struct PhaseClock {
    started_at: Option<Instant>,
    last: Option<Duration>,
    completed: u64,
}

impl PhaseClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the interval at `now`
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    /// Close the running interval at `now` and record it.
    ///
    /// Returns `None` when the clock was not running.
    pub fn stop(&mut self, now: Instant) -> Option<Duration> {
        let started_at = self.started_at.take()?;
        let elapsed = now.saturating_duration_since(started_at);
        self.last = Some(elapsed);
        self.completed += 1;
        Some(elapsed)
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Most recently recorded interval
    pub fn last(&self) -> Option<Duration> {
        self.last
    }

    /// Number of intervals recorded so far
    pub fn completed(&self) -> u64 {
        self.completed
    }
}
