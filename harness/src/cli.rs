//! Command-line interface definitions.
//!
//! Flags override the values loaded by [`Config::from_env`].

use crate::config::{Config, SubscribeMethod};
use crate::error::HarnessError;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;

/// sseload - churn and broadcast-throughput load tests for SSE servers.
#[derive(Parser, Debug)]
#[command(name = "sseload")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Use JSON log format instead of pretty
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open and abort subscribe connections until the drop goal is reached
    Drain(DrainArgs),

    /// Measure broadcast delivery time over a fixed pool of subscribers
    Bench(BenchArgs),
}

/// Server under test
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Target host
    #[arg(long)]
    pub host: Option<String>,

    /// Target port
    #[arg(long)]
    pub port: Option<u16>,
}

/// Arguments for the `drain` subcommand.
#[derive(Args, Debug, Default)]
pub struct DrainArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Stop churning after this many dropped connections
    #[arg(long)]
    pub drop_goal: Option<u64>,

    /// Subscribe method expected by the server (get or post)
    #[arg(long)]
    pub method: Option<SubscribeMethodArg>,

    /// Cap on outstanding subscribe attempts
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Liveness probe timeout in milliseconds
    #[arg(long)]
    pub probe_timeout_ms: Option<u64>,

    /// Liveness probe interval in milliseconds
    #[arg(long)]
    pub probe_interval_ms: Option<u64>,
}

/// Arguments for the `bench` subcommand.
#[derive(Args, Debug, Default)]
pub struct BenchArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Number of persistent subscribers
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Message published on every cycle
    #[arg(long)]
    pub message: Option<String>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum SubscribeMethodArg {
    Get,
    Post,
}

impl From<SubscribeMethodArg> for SubscribeMethod {
    fn from(arg: SubscribeMethodArg) -> Self {
        match arg {
            SubscribeMethodArg::Get => SubscribeMethod::Get,
            SubscribeMethodArg::Post => SubscribeMethod::Post,
        }
    }
}

impl TargetArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.target.host = host.clone();
        }
        if let Some(port) = self.port {
            config.target.port = port;
        }
    }
}

impl DrainArgs {
    pub fn apply(&self, config: &mut Config) {
        self.target.apply(config);
        if let Some(goal) = self.drop_goal {
            config.churn.drop_goal = goal;
        }
        if let Some(method) = self.method {
            config.churn.method = method.into();
        }
        if let Some(cap) = self.max_in_flight {
            config.churn.max_in_flight = cap;
        }
        if let Some(ms) = self.probe_timeout_ms {
            config.probe.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.probe_interval_ms {
            config.probe.interval = Duration::from_millis(ms);
        }
    }
}

impl BenchArgs {
    pub fn apply(&self, config: &mut Config) {
        self.target.apply(config);
        if let Some(size) = self.pool_size {
            config.bench.pool_size = size;
        }
        if let Some(message) = &self.message {
            config.bench.message = message.clone();
        }
    }
}

impl Cli {
    /// Layer the command-line overrides onto `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(addr) = self.metrics_addr {
            config.metrics_addr = Some(addr);
        }
        match &self.command {
            Commands::Drain(args) => args.apply(config),
            Commands::Bench(args) => args.apply(config),
        }
    }

    /// Check only the settings the selected subcommand uses
    pub fn validate(&self, config: &Config) -> Result<(), HarnessError> {
        match self.command {
            Commands::Drain(_) => config.validate_churn(),
            Commands::Bench(_) => config.validate_bench(),
        }
    }
}
