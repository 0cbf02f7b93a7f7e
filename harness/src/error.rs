//! Error types for the harness

use thiserror::Error;

/// Errors raised by the harness.
///
/// Only configuration and startup failures are ever surfaced to the caller of
/// a driver; per-connection variants are absorbed inside the driver loops.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    #[error("Event stream closed by server")]
    StreamClosed,

    #[error("Metrics exporter error: {0}")]
    Metrics(String),
}

impl HarnessError {
    /// Whether this error came from the connection itself (refused, reset,
    /// timed out) rather than from a well-formed response.
    pub fn is_connection_level(&self) -> bool {
        match self {
            HarnessError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            HarnessError::StreamClosed => true,
            _ => false,
        }
    }
}
