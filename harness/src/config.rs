//! Harness configuration
//!
//! Configuration is loaded from environment variables and then overridden by
//! command-line flags. Every variable is optional; unparsable values are
//! ignored and the default is kept.

use crate::error::HarnessError;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Main harness configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server under test
    pub target: TargetConfig,

    /// Churn/drain driver configuration
    pub churn: ChurnConfig,

    /// Liveness probe configuration
    pub probe: ProbeConfig,

    /// Throughput benchmark configuration
    pub bench: BenchConfig,

    /// How often the status line is redrawn
    pub status_interval: Duration,

    /// Prometheus exporter listen address (disabled when unset)
    pub metrics_addr: Option<SocketAddr>,
}

/// Address of the SSE server under test
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
}

/// HTTP method used for subscribe requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscribeMethod {
    Get,
    #[default]
    Post,
}

impl FromStr for SubscribeMethod {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(SubscribeMethod::Get),
            "POST" => Ok(SubscribeMethod::Post),
            other => Err(HarnessError::InvalidConfig(format!(
                "unsupported subscribe method: {other}"
            ))),
        }
    }
}

impl fmt::Display for SubscribeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscribeMethod::Get => f.write_str("GET"),
            SubscribeMethod::Post => f.write_str("POST"),
        }
    }
}

/// Churn driver configuration
#[derive(Debug, Clone)]
pub struct ChurnConfig {
    /// Number of successful connect/abort cycles after which churn stops
    pub drop_goal: u64,
    /// Subscribe request method
    pub method: SubscribeMethod,
    /// Delay between churn ticks (zero = back-to-back)
    pub tick_interval: Duration,
    /// Outstanding attempts above which a tick issues nothing
    pub max_in_flight: usize,
    /// Upper bound on a single attempt, from request to welcome marker
    pub attempt_timeout: Duration,
}

/// Liveness probe configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Throughput benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of persistent subscribers (N)
    pub pool_size: usize,
    /// Payload prefix published on every cycle
    pub message: String,
    /// Phase check interval
    pub tick_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            churn: ChurnConfig::default(),
            probe: ProbeConfig::default(),
            bench: BenchConfig::default(),
            status_interval: Duration::from_millis(20),
            metrics_addr: None,
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            drop_goal: 5_000,
            method: SubscribeMethod::Post,
            tick_interval: Duration::ZERO,
            max_in_flight: 1024,
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(100),
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            pool_size: 1000,
            message: "msg".to_string(),
            tick_interval: Duration::from_millis(20),
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Target
        if let Ok(host) = env::var("SSELOAD_HOST")
            && !host.is_empty()
        {
            config.target.host = host;
        }
        if let Ok(port) = env::var("SSELOAD_PORT")
            && let Ok(p) = port.parse()
        {
            config.target.port = p;
        }

        // Churn
        if let Ok(val) = env::var("SSELOAD_DROP_GOAL")
            && let Ok(v) = val.parse()
        {
            config.churn.drop_goal = v;
        }
        if let Ok(val) = env::var("SSELOAD_METHOD")
            && let Ok(m) = val.parse()
        {
            config.churn.method = m;
        }
        if let Some(d) = env_millis("SSELOAD_CHURN_INTERVAL_MS") {
            config.churn.tick_interval = d;
        }
        if let Ok(val) = env::var("SSELOAD_MAX_IN_FLIGHT")
            && let Ok(v) = val.parse()
        {
            config.churn.max_in_flight = v;
        }
        if let Some(d) = env_millis("SSELOAD_ATTEMPT_TIMEOUT_MS") {
            config.churn.attempt_timeout = d;
        }

        // Probe
        if let Some(d) = env_millis("SSELOAD_PROBE_INTERVAL_MS") {
            config.probe.interval = d;
        }
        if let Some(d) = env_millis("SSELOAD_PROBE_TIMEOUT_MS") {
            config.probe.timeout = d;
        }

        // Benchmark
        if let Ok(val) = env::var("SSELOAD_POOL_SIZE")
            && let Ok(v) = val.parse()
        {
            config.bench.pool_size = v;
        }
        if let Ok(msg) = env::var("SSELOAD_MESSAGE")
            && !msg.is_empty()
        {
            config.bench.message = msg;
        }
        if let Some(d) = env_millis("SSELOAD_BENCH_INTERVAL_MS") {
            config.bench.tick_interval = d;
        }

        if let Some(d) = env_millis("SSELOAD_STATUS_INTERVAL_MS") {
            config.status_interval = d;
        }
        if let Ok(addr) = env::var("SSELOAD_METRICS_ADDR")
            && let Ok(a) = addr.parse()
        {
            config.metrics_addr = Some(a);
        }

        config
    }

    /// Base URL of the server under test, without a trailing slash
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.target.host, self.target.port)
    }

    /// Reject values the churn driver and liveness probe cannot run with
    pub fn validate_churn(&self) -> Result<(), HarnessError> {
        self.validate_common()?;

        if self.churn.max_in_flight == 0 {
            return invalid("max in-flight attempts must be at least 1");
        }
        if self.churn.attempt_timeout.is_zero() {
            return invalid("attempt timeout must be non-zero");
        }
        if self.probe.interval.is_zero() || self.probe.timeout.is_zero() {
            return invalid("probe interval and timeout must be non-zero");
        }

        Ok(())
    }

    /// Reject values the throughput benchmark cannot run with
    pub fn validate_bench(&self) -> Result<(), HarnessError> {
        self.validate_common()?;

        if self.bench.pool_size == 0 {
            return invalid("pool size must be at least 1");
        }
        if self.bench.tick_interval.is_zero() {
            return invalid("benchmark interval must be non-zero");
        }
        if self.bench.message.is_empty() {
            return invalid("message must not be empty");
        }
        // Published as a single path segment and echoed back as a single SSE line
        if self.bench.message.chars().any(|c| {
            matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
        }) {
            return invalid("message must be a single URL path segment without whitespace");
        }

        Ok(())
    }

    fn validate_common(&self) -> Result<(), HarnessError> {
        if self.target.host.is_empty() {
            return invalid("target host must not be empty");
        }
        if self.status_interval.is_zero() {
            return invalid("status interval must be non-zero");
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Result<(), HarnessError> {
    Err(HarnessError::InvalidConfig(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.target.host, "127.0.0.1");
        assert_eq!(config.target.port, 8080);
        assert_eq!(config.churn.drop_goal, 5_000);
        assert_eq!(config.churn.method, SubscribeMethod::Post);
        assert!(config.churn.tick_interval.is_zero());
        assert_eq!(config.probe.interval, Duration::from_millis(20));
        assert_eq!(config.probe.timeout, Duration::from_millis(100));
        assert_eq!(config.bench.pool_size, 1000);
        assert_eq!(config.bench.message, "msg");
        assert!(config.metrics_addr.is_none());
        assert!(config.validate_churn().is_ok());
        assert!(config.validate_bench().is_ok());
    }

    #[test]
    fn test_config_from_env() {
        // No SSELOAD_* variables are set in the test environment
        let config = Config::from_env();
        assert_eq!(config.target.host, "127.0.0.1");
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_subscribe_method_parse() {
        assert_eq!("get".parse::<SubscribeMethod>().unwrap(), SubscribeMethod::Get);
        assert_eq!("POST".parse::<SubscribeMethod>().unwrap(), SubscribeMethod::Post);
        assert!("PUT".parse::<SubscribeMethod>().is_err());
        assert_eq!(SubscribeMethod::Get.to_string(), "GET");
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut config = Config::default();
        config.bench.pool_size = 0;
        assert!(matches!(
            config.validate_bench(),
            Err(HarnessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unsafe_message() {
        for message in ["", "a/b", "two words", "line\nbreak", "50%"] {
            let mut config = Config::default();
            config.bench.message = message.to_string();
            assert!(config.validate_bench().is_err(), "accepted {message:?}");
        }
    }

    #[test]
    fn test_validate_rejects_zero_probe_timeout() {
        let mut config = Config::default();
        config.probe.timeout = Duration::ZERO;
        assert!(config.validate_churn().is_err());
    }

    #[test]
    fn test_zero_churn_interval_is_valid() {
        let mut config = Config::default();
        config.churn.tick_interval = Duration::ZERO;
        config.churn.drop_goal = 0;
        assert!(config.validate_churn().is_ok());
    }

    #[test]
    fn test_benchmark_settings_do_not_block_churn() {
        let mut config = Config::default();
        config.bench.message = "two words".to_string();
        config.bench.pool_size = 0;
        assert!(config.validate_churn().is_ok());
        assert!(config.validate_bench().is_err());
    }

    #[test]
    fn test_churn_settings_do_not_block_benchmark() {
        let mut config = Config::default();
        config.churn.max_in_flight = 0;
        config.probe.timeout = Duration::ZERO;
        assert!(config.validate_bench().is_ok());
        assert!(config.validate_churn().is_err());
    }

    #[test]
    fn test_empty_host_rejected_in_both_modes() {
        let mut config = Config::default();
        config.target.host.clear();
        assert!(config.validate_churn().is_err());
        assert!(config.validate_bench().is_err());
    }
}
