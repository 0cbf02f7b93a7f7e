//! Broadcast throughput benchmark
//!
//! A fixed pool of N subscribers connects once and stays connected. The
//! benchmark then cycles forever:
//!
//! ```text
//! Connecting ──(connected == N)──> Messaging ──(publish)──> Waiting
//!                                      ^                       │
//!                                      └──(messages >= N)──────┘
//! ```
//!
//! [`PhaseMachine`] holds the phase logic and timers with no I/O, so it can be
//! driven directly in tests. [`ThroughputBenchmark`] wires it to the network.

use crate::client::SseClient;
use crate::clock::PhaseClock;
use crate::config::{BenchConfig, SubscribeMethod};
use crate::pool::{AttemptId, AttemptState, SubscriberPool};
use crate::protocol::{SseEvent, cycle_payload};
use crate::scheduler::Ticker;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Benchmark phase; exactly one is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkPhase {
    Connecting,
    Messaging,
    Waiting,
}

/// Side effect requested by a phase transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    /// Publish the payload for this cycle
    Publish { cycle: u64 },
}

/// Phase state machine and its two timers
#[derive(Debug)]
pub struct PhaseMachine {
    pool_size: usize,
    phase: BenchmarkPhase,
    connected: usize,
    messages: usize,
    cycle: u64,
    connection_clock: PhaseClock,
    broadcast_clock: PhaseClock,
}

impl PhaseMachine {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            phase: BenchmarkPhase::Connecting,
            connected: 0,
            messages: 0,
            cycle: 0,
            connection_clock: PhaseClock::new(),
            broadcast_clock: PhaseClock::new(),
        }
    }

    /// Mark the start of the run; `connection_time` is measured from here
    pub fn begin(&mut self, now: Instant) {
        if self.phase == BenchmarkPhase::Connecting {
            self.connection_clock.start(now);
        }
    }

    /// One pool member saw its welcome marker
    pub fn record_connected(&mut self) {
        self.connected += 1;
    }

    /// One pool member received the payload of `cycle`.
    ///
    /// Only deliveries for the cycle currently being waited on are counted;
    /// anything else is a straggler and is ignored.
    pub fn record_delivery(&mut self, cycle: u64) -> bool {
        if self.phase == BenchmarkPhase::Waiting && cycle == self.cycle {
            self.messages += 1;
            true
        } else {
            false
        }
    }

    /// Evaluate phase transitions at `now`.
    ///
    /// Checks run in phase order so at most one publish is requested per tick.
    pub fn tick(&mut self, now: Instant) -> Option<PhaseAction> {
        let mut action = None;

        if self.phase == BenchmarkPhase::Connecting && self.connected >= self.pool_size {
            self.connection_clock.stop(now);
            self.phase = BenchmarkPhase::Messaging;
            debug!(
                "All {} subscribers connected in {:?}",
                self.pool_size,
                self.connection_time()
            );
        }

        if self.phase == BenchmarkPhase::Messaging {
            self.phase = BenchmarkPhase::Waiting;
            self.cycle += 1;
            self.broadcast_clock.start(now);
            action = Some(PhaseAction::Publish { cycle: self.cycle });
        }

        if self.phase == BenchmarkPhase::Waiting && self.messages >= self.pool_size {
            self.broadcast_clock.stop(now);
            self.messages = 0;
            self.phase = BenchmarkPhase::Messaging;
            debug!(
                "Cycle {} delivered to all subscribers in {:?}",
                self.cycle,
                self.broadcast_time()
            );
        }

        action
    }

    pub fn phase(&self) -> BenchmarkPhase {
        self.phase
    }

    pub fn connected(&self) -> usize {
        self.connected
    }

    pub fn messages(&self) -> usize {
        self.messages
    }

    /// Cycle currently (or last) published; 0 before the first publish
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn connection_time(&self) -> Option<Duration> {
        self.connection_clock.last()
    }

    pub fn broadcast_time(&self) -> Option<Duration> {
        self.broadcast_clock.last()
    }

    /// Number of `connection_time` recordings (0 or 1)
    pub fn connection_recordings(&self) -> u64 {
        self.connection_clock.completed()
    }

    /// Number of fully delivered cycles
    pub fn cycles_completed(&self) -> u64 {
        self.broadcast_clock.completed()
    }
}

/// Point-in-time copy of the benchmark state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchSnapshot {
    pub phase: BenchmarkPhase,
    pub pool_size: usize,
    pub connected: usize,
    pub failed: usize,
    pub messages: usize,
    pub cycle: u64,
    pub cycles_completed: u64,
    pub connection_time_ms: Option<u64>,
    pub broadcast_time_ms: Option<u64>,
}

/// Throughput benchmark driver
pub struct ThroughputBenchmark {
    client: SseClient,
    config: BenchConfig,
    pool: Arc<SubscriberPool>,
    machine: Arc<Mutex<PhaseMachine>>,
    started: AtomicBool,
}

impl ThroughputBenchmark {
    pub fn new(client: SseClient, config: BenchConfig) -> Self {
        let pool = Arc::new(SubscriberPool::new(config.pool_size));
        let machine = Arc::new(Mutex::new(PhaseMachine::new(config.pool_size)));
        Self {
            client,
            config,
            pool,
            machine,
            started: AtomicBool::new(false),
        }
    }

    /// Open all N subscribe connections concurrently (only once per run)
    pub fn start_subscribers(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(
            "Opening {} subscribers to {}",
            self.config.pool_size,
            self.client.base_url()
        );
        self.machine.lock().begin(Instant::now());

        let message: Arc<str> = Arc::from(self.config.message.as_str());
        for id in 0..self.pool.len() as AttemptId {
            tokio::spawn(run_subscriber(
                id,
                self.client.clone(),
                message.clone(),
                self.pool.clone(),
                self.machine.clone(),
            ));
        }
    }

    /// Evaluate phase transitions; spawns the publish when one is due
    pub fn tick(&self) -> Option<PhaseAction> {
        let (action, delivered_in) = {
            let mut machine = self.machine.lock();
            let completed_before = machine.cycles_completed();
            let action = machine.tick(Instant::now());
            let completed = machine.cycles_completed() > completed_before;
            (action, completed.then(|| machine.broadcast_time()).flatten())
        };

        if let Some(broadcast) = delivered_in {
            counter!("sseload_bench_cycles_total").increment(1);
            gauge!("sseload_bench_broadcast_ms").set(broadcast.as_secs_f64() * 1000.0);
        }

        if let Some(PhaseAction::Publish { cycle }) = action {
            if cycle == 1 {
                let connection_time = self.machine.lock().connection_time();
                if let Some(elapsed) = connection_time {
                    gauge!("sseload_bench_connection_ms").set(elapsed.as_secs_f64() * 1000.0);
                }
                info!(
                    "All {} subscribers connected after {:?}",
                    self.config.pool_size, connection_time
                );
            }

            let client = self.client.clone();
            let payload = cycle_payload(&self.config.message, cycle);
            tokio::spawn(async move {
                if let Err(e) = client.publish(&payload).await {
                    warn!("Publish of {} failed: {}", payload, e);
                }
            });
        }

        action
    }

    pub fn phase(&self) -> BenchmarkPhase {
        self.machine.lock().phase()
    }

    pub fn snapshot(&self) -> BenchSnapshot {
        let failed = self.pool.count(AttemptState::Failed);
        let machine = self.machine.lock();
        BenchSnapshot {
            phase: machine.phase(),
            pool_size: self.config.pool_size,
            connected: machine.connected(),
            failed,
            messages: machine.messages(),
            cycle: machine.cycle(),
            cycles_completed: machine.cycles_completed(),
            connection_time_ms: machine.connection_time().map(|d| d.as_millis() as u64),
            broadcast_time_ms: machine.broadcast_time().map(|d| d.as_millis() as u64),
        }
    }

    /// Connect the pool, then tick forever
    pub async fn run(&self) {
        self.start_subscribers();

        let mut ticker = Ticker::new(self.config.tick_interval);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }
}

/// Extract the cycle number from a `{message}-{cycle}` payload
fn parse_cycle(message: &str, payload: &str) -> Option<u64> {
    payload
        .strip_prefix(message)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

async fn run_subscriber(
    id: AttemptId,
    client: SseClient,
    message: Arc<str>,
    pool: Arc<SubscriberPool>,
    machine: Arc<Mutex<PhaseMachine>>,
) {
    let mut stream = match client.subscribe(SubscribeMethod::Get).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Subscriber {} could not connect: {}", id, e);
            pool.mark_failed(id);
            return;
        }
    };

    // A member counts at most one delivery per cycle
    let mut last_counted = 0;

    loop {
        match stream.next_event().await {
            Ok(SseEvent::Welcome) => {
                if pool.mark_connected(id) {
                    let connected = {
                        let mut machine = machine.lock();
                        machine.record_connected();
                        machine.connected()
                    };
                    gauge!("sseload_bench_connected").set(connected as f64);
                }
            }
            Ok(SseEvent::Data(payload)) => {
                if let Some(cycle) = parse_cycle(&message, &payload)
                    && cycle > last_counted
                    && machine.lock().record_delivery(cycle)
                {
                    last_counted = cycle;
                }
            }
            Ok(SseEvent::Ping) => {}
            Err(e) => {
                if pool.state(id) == Some(AttemptState::Connected) {
                    warn!("Subscriber {} lost its stream: {}", id, e);
                } else {
                    debug!("Subscriber {} closed before welcome: {}", id, e);
                    pool.mark_failed(id);
                }
                return;
            }
        }
    }
}
