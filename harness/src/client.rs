//! HTTP client for the SSE server under test
//!
//! Wraps two `reqwest` clients: one for long-lived subscribe streams and
//! publishes, and one that keeps no idle connections so every liveness probe
//! goes through a fresh accept on the server.

use crate::config::{Config, SubscribeMethod};
use crate::error::HarnessError;
use crate::protocol::{EventScanner, SseEvent};
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

type BodyStream = Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

/// Outcome of one liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server answered before the timeout
    Responded,
    /// No answer before the timeout
    TimedOut,
    /// Connection refused or reset
    Refused,
}

impl ProbeOutcome {
    pub fn is_accepting(self) -> bool {
        matches!(self, ProbeOutcome::Responded)
    }
}

/// Client bound to one server under test
#[derive(Clone)]
pub struct SseClient {
    base_url: String,
    http: reqwest::Client,
    probe_http: reqwest::Client,
}

impl SseClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, HarnessError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().build()?;
        let probe_http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            base_url,
            http,
            probe_http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, HarnessError> {
        Self::new(config.base_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Open a subscribe stream on `/events`.
    ///
    /// Resolves once response headers arrive; the welcome marker is read from
    /// the returned stream.
    pub async fn subscribe(&self, method: SubscribeMethod) -> Result<EventStream, HarnessError> {
        let url = format!("{}/events", self.base_url);
        let request = match method {
            SubscribeMethod::Get => self.http.get(&url),
            SubscribeMethod::Post => self.http.post(&url),
        };

        let response = request
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HarnessError::UnexpectedStatus(response.status().as_u16()));
        }

        Ok(EventStream::new(Box::pin(response.bytes_stream())))
    }

    /// Ask the server to broadcast `payload` to every subscriber.
    ///
    /// The response body is read and discarded.
    pub async fn publish(&self, payload: &str) -> Result<(), HarnessError> {
        let url = format!("{}/broadcast/{}", self.base_url, payload);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        // Drain so the connection can go back to the pool
        let _ = response.bytes().await;

        if !status.is_success() {
            return Err(HarnessError::UnexpectedStatus(status.as_u16()));
        }
        Ok(())
    }

    /// Issue a plain `GET /` bounded by `timeout`
    pub async fn probe(&self, timeout: Duration) -> ProbeOutcome {
        let url = format!("{}/", self.base_url);
        match tokio::time::timeout(timeout, self.probe_http.get(&url).send()).await {
            Ok(Ok(_)) => ProbeOutcome::Responded,
            Ok(Err(e)) => {
                debug!("Liveness probe failed: {}", e);
                ProbeOutcome::Refused
            }
            Err(_) => ProbeOutcome::TimedOut,
        }
    }
}

/// Decoded event stream of one subscribe connection.
///
/// Dropping it tears the connection down without any unsubscribe handshake.
pub struct EventStream {
    body: BodyStream,
    scanner: EventScanner,
    ready: VecDeque<SseEvent>,
}

impl EventStream {
    fn new(body: BodyStream) -> Self {
        Self {
            body,
            scanner: EventScanner::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next `data:` event, or `StreamClosed` once the server ends the body
    pub async fn next_event(&mut self) -> Result<SseEvent, HarnessError> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(event);
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.ready.extend(self.scanner.feed(&chunk)),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(HarnessError::StreamClosed),
            }
        }
    }

    /// Read until the welcome event, skipping anything that precedes it
    pub async fn wait_for_welcome(&mut self) -> Result<(), HarnessError> {
        loop {
            if self.next_event().await? == SseEvent::Welcome {
                return Ok(());
            }
        }
    }

    /// Abort the connection immediately
    pub fn abort(self) {
        drop(self);
    }
}
