//! sseload - load-test harness for Server-Sent Events servers
//!
//! Two drivers share one HTTP client layer:
//! - [`churn`]: open-and-abort connection churn with a liveness probe
//! - [`bench`]: broadcast throughput over a fixed subscriber pool

pub mod bench;
pub mod churn;
pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod scheduler;
pub mod status;
pub mod telemetry;

// Re-export commonly used types
pub use bench::{BenchSnapshot, BenchmarkPhase, PhaseMachine, ThroughputBenchmark};
pub use churn::{ChurnCounters, ChurnDriver, ChurnSnapshot, LivenessProbe};
pub use client::{ProbeOutcome, SseClient};
pub use config::{Config, SubscribeMethod};
pub use error::HarnessError;
