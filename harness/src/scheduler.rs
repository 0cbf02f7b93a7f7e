//! Fixed-rate tick source for the driver loops
//!
//! Each driver awaits its own ticker and runs the tick body to completion
//! before awaiting again, so ticks of one driver never overlap.

use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Periodic tick source.
///
/// A zero period means "as fast as the scheduler allows": each tick just
/// yields to the runtime so spawned connection tasks still make progress.
pub enum Ticker {
    Immediate,
    Every(Interval),
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        if period.is_zero() {
            Ticker::Immediate
        } else {
            let mut interval = tokio::time::interval(period);
            // Falling behind must not produce a burst of catch-up ticks
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            Ticker::Every(interval)
        }
    }

    pub async fn tick(&mut self) {
        match self {
            Ticker::Immediate => tokio::task::yield_now().await,
            Ticker::Every(interval) => {
                interval.tick().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_zero_period_does_not_sleep() {
        let mut ticker = Ticker::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..1000 {
            ticker.tick().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_fixed_period_spacing() {
        let mut ticker = Ticker::new(Duration::from_millis(10));
        // First tick completes immediately
        ticker.tick().await;
        let start = Instant::now();
        ticker.tick().await;
        ticker.tick().await;
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
