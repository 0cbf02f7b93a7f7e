//! Logging and metrics setup
//!
//! Logs go to stderr; stdout is reserved for the status line.

use crate::error::HarnessError;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "sseload=info";

/// Install the global tracing subscriber
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Serve Prometheus metrics on `addr`.
///
/// Must be called from within the tokio runtime. Without it the `metrics`
/// macros are no-ops.
pub fn install_metrics_exporter(addr: SocketAddr) -> Result<(), HarnessError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| HarnessError::Metrics(e.to_string()))
}
