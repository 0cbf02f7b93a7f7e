//! Churn/drain driver and liveness probe
//!
//! The churn driver opens subscribe connections back-to-back, aborts each one
//! the moment the welcome marker arrives, and counts the drops up to a goal.
//! The liveness probe runs on its own slower loop and records whether the
//! server still answers a plain `GET /` within a short timeout.

use crate::client::{ProbeOutcome, SseClient};
use crate::config::{ChurnConfig, ProbeConfig, SubscribeMethod};
use crate::error::HarnessError;
use crate::pool::{AttemptId, AttemptRegistry, AttemptState};
use crate::scheduler::Ticker;
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const ACCEPTING_UNKNOWN: u8 = 0;
const ACCEPTING_NO: u8 = 1;
const ACCEPTING_YES: u8 = 2;

/// Process-wide churn state shared by the churn loop, the probe and the
/// status reporter
#[derive(Debug)]
pub struct ChurnCounters {
    drop_goal: u64,
    dropped: AtomicU64,
    failed: AtomicU64,
    accepting: AtomicU8,
}

/// Point-in-time copy of the churn state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChurnSnapshot {
    pub dropped: u64,
    pub drop_goal: u64,
    pub failed: u64,
    pub in_flight: usize,
    pub attempts: u64,
    pub accepting_connections: Option<bool>,
}

impl ChurnCounters {
    pub fn new(drop_goal: u64) -> Self {
        Self {
            drop_goal,
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            accepting: AtomicU8::new(ACCEPTING_UNKNOWN),
        }
    }

    pub fn drop_goal(&self) -> u64 {
        self.drop_goal
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn goal_reached(&self) -> bool {
        self.dropped() >= self.drop_goal
    }

    /// Count one dropped connection, saturating at the goal.
    ///
    /// Returns `false` when the goal had already been reached.
    pub fn record_drop(&self) -> bool {
        self.dropped
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.drop_goal).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Store the latest probe result, returning the previous one
    pub fn set_accepting(&self, accepting: bool) -> Option<bool> {
        let value = if accepting { ACCEPTING_YES } else { ACCEPTING_NO };
        decode_accepting(self.accepting.swap(value, Ordering::SeqCst))
    }

    /// Result of the most recent completed probe, `None` before the first
    pub fn accepting_connections(&self) -> Option<bool> {
        decode_accepting(self.accepting.load(Ordering::SeqCst))
    }
}

fn decode_accepting(value: u8) -> Option<bool> {
    match value {
        ACCEPTING_YES => Some(true),
        ACCEPTING_NO => Some(false),
        _ => None,
    }
}

/// What a single churn tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new subscribe attempt was spawned
    Issued(AttemptId),
    /// `dropped` reached the goal; nothing more will be issued
    GoalReached,
    /// Too many attempts are still outstanding; try again next tick
    Saturated,
}

/// Connect/abort churn driver
pub struct ChurnDriver {
    client: SseClient,
    config: ChurnConfig,
    counters: Arc<ChurnCounters>,
    attempts: Arc<AttemptRegistry>,
    goal_logged: AtomicBool,
}

impl ChurnDriver {
    pub fn new(client: SseClient, config: ChurnConfig) -> Self {
        let counters = Arc::new(ChurnCounters::new(config.drop_goal));
        Self::with_counters(client, config, counters)
    }

    /// Build a driver around counters shared with a [`LivenessProbe`]
    pub fn with_counters(
        client: SseClient,
        config: ChurnConfig,
        counters: Arc<ChurnCounters>,
    ) -> Self {
        Self {
            client,
            config,
            counters,
            attempts: Arc::new(AttemptRegistry::new()),
            goal_logged: AtomicBool::new(false),
        }
    }

    pub fn counters(&self) -> Arc<ChurnCounters> {
        self.counters.clone()
    }

    /// Attempts issued and not yet aborted or failed
    pub fn in_flight(&self) -> usize {
        self.attempts.in_flight()
    }

    pub fn snapshot(&self) -> ChurnSnapshot {
        ChurnSnapshot {
            dropped: self.counters.dropped(),
            drop_goal: self.counters.drop_goal(),
            failed: self.counters.failed(),
            in_flight: self.attempts.in_flight(),
            attempts: self.attempts.opened(),
            accepting_connections: self.counters.accepting_connections(),
        }
    }

    /// Issue at most one new subscribe attempt.
    ///
    /// Must be called from within a tokio runtime; the attempt runs in its own
    /// task and the tick returns immediately.
    pub fn tick(&self) -> TickOutcome {
        if self.counters.goal_reached() {
            if !self.goal_logged.swap(true, Ordering::Relaxed) {
                info!(
                    "Drop goal reached: {} connections dropped",
                    self.counters.dropped()
                );
            }
            return TickOutcome::GoalReached;
        }
        if self.attempts.in_flight() >= self.config.max_in_flight {
            return TickOutcome::Saturated;
        }

        let id = self.attempts.open();
        counter!("sseload_churn_attempts_total").increment(1);
        gauge!("sseload_churn_in_flight").set(self.attempts.in_flight() as f64);

        tokio::spawn(run_attempt(
            id,
            self.client.clone(),
            self.config.method,
            self.config.attempt_timeout,
            self.counters.clone(),
            self.attempts.clone(),
        ));

        TickOutcome::Issued(id)
    }

    /// Tick forever at the configured cadence
    pub async fn run(&self) {
        info!(
            "Churn driver started: target={}, method={}, drop_goal={}",
            self.client.base_url(),
            self.config.method,
            self.config.drop_goal
        );

        let mut ticker = Ticker::new(self.config.tick_interval);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }
}

async fn run_attempt(
    id: AttemptId,
    client: SseClient,
    method: SubscribeMethod,
    attempt_timeout: Duration,
    counters: Arc<ChurnCounters>,
    attempts: Arc<AttemptRegistry>,
) {
    let connect = async {
        let mut stream = client.subscribe(method).await?;
        stream.wait_for_welcome().await?;
        Ok::<_, HarnessError>(stream)
    };

    match tokio::time::timeout(attempt_timeout, connect).await {
        Ok(Ok(stream)) => {
            if attempts.mark_connected(id) && counters.record_drop() {
                counter!("sseload_churn_dropped_total").increment(1);
            }
            // Nothing after the welcome marker is read
            stream.abort();
            if let Some(attempt) = attempts.release(id, AttemptState::Aborted) {
                debug!("Churn attempt {} dropped after {:?}", id, attempt.elapsed());
            }
        }
        Ok(Err(e)) => {
            let kind = if e.is_connection_level() {
                "connection"
            } else {
                "response"
            };
            debug!("Churn attempt {} failed: {}", id, e);
            counter!("sseload_churn_failures_total", "kind" => kind).increment(1);
            counters.record_failure();
            attempts.release(id, AttemptState::Failed);
        }
        Err(_) => {
            debug!("Churn attempt {} timed out after {:?}", id, attempt_timeout);
            counter!("sseload_churn_failures_total", "kind" => "timeout").increment(1);
            counters.record_failure();
            attempts.release(id, AttemptState::Failed);
        }
    }

    gauge!("sseload_churn_in_flight").set(attempts.in_flight() as f64);
}

/// Periodic `GET /` health check feeding `accepting_connections`
pub struct LivenessProbe {
    client: SseClient,
    config: ProbeConfig,
    counters: Arc<ChurnCounters>,
}

impl LivenessProbe {
    pub fn new(client: SseClient, config: ProbeConfig, counters: Arc<ChurnCounters>) -> Self {
        Self {
            client,
            config,
            counters,
        }
    }

    /// Run one probe and publish its result.
    ///
    /// The stored result is only replaced once this probe resolves or times
    /// out.
    pub async fn probe_once(&self) -> ProbeOutcome {
        let outcome = self.client.probe(self.config.timeout).await;
        let accepting = outcome.is_accepting();
        let previous = self.counters.set_accepting(accepting);

        gauge!("sseload_probe_accepting").set(if accepting { 1.0 } else { 0.0 });
        if previous != Some(accepting) {
            info!("Server accepting connections: {} ({:?})", accepting, outcome);
        }

        outcome
    }

    /// Probe forever; probes never overlap one another
    pub async fn run(&self) {
        let mut ticker = Ticker::new(self.config.interval);
        loop {
            ticker.tick().await;
            self.probe_once().await;
        }
    }
}
