//! Common Test Utilities for Integration Tests
//!
//! An in-process SSE server with the same surface as the servers the harness
//! targets: `/events` (GET and POST), `/broadcast/:msg` and `/`.

#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Knobs for misbehaving servers
#[derive(Debug, Clone)]
pub struct FixtureOptions {
    /// Send `data: connected` as soon as a subscriber attaches
    pub send_welcome: bool,
    /// Delay before `GET /` answers
    pub root_delay: Duration,
    /// Delay between receiving a broadcast and echoing it to subscribers
    pub broadcast_delay: Duration,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            send_welcome: true,
            root_delay: Duration::ZERO,
            broadcast_delay: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
struct FixtureState {
    options: FixtureOptions,
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<Bytes>>>>,
    subscribes: Arc<AtomicUsize>,
    broadcasts: Arc<AtomicUsize>,
}

impl FixtureState {
    fn send_all(&self, frame: String) {
        let frame = Bytes::from(frame);
        self.subscribers
            .lock()
            .retain(|tx| tx.send(frame.clone()).is_ok());
    }
}

/// Running fixture server; shut down on drop
pub struct TestServer {
    pub addr: SocketAddr,
    state: FixtureState,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(FixtureOptions::default()).await
    }

    pub async fn start_with(options: FixtureOptions) -> Self {
        let state = FixtureState {
            options,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            subscribes: Arc::new(AtomicUsize::new(0)),
            broadcasts: Arc::new(AtomicUsize::new(0)),
        };

        let app = Router::new()
            .route("/", get(root))
            .route("/events", get(events).post(events))
            .route("/broadcast/:msg", get(broadcast))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fixture listener");
        let addr = listener.local_addr().expect("fixture address");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Subscribe requests accepted so far
    pub fn subscribes(&self) -> usize {
        self.state.subscribes.load(Ordering::SeqCst)
    }

    /// Broadcast requests handled so far
    pub fn broadcasts(&self) -> usize {
        self.state.broadcasts.load(Ordering::SeqCst)
    }

    /// Subscribers whose streams are still open as of the last send
    pub fn live_subscribers(&self) -> usize {
        self.state.subscribers.lock().len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn root(State(state): State<FixtureState>) -> &'static str {
    if !state.options.root_delay.is_zero() {
        tokio::time::sleep(state.options.root_delay).await;
    }
    "ok"
}

async fn events(State(state): State<FixtureState>) -> Response {
    let (tx, rx) = mpsc::unbounded_channel();
    if state.options.send_welcome {
        let _ = tx.send(Bytes::from_static(b"data: connected\n\n"));
    }
    state.subscribers.lock().push(tx);
    state.subscribes.fetch_add(1, Ordering::SeqCst);

    let body = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok::<_, Infallible>(frame), rx))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

async fn broadcast(State(state): State<FixtureState>, Path(msg): Path<String>) -> &'static str {
    state.broadcasts.fetch_add(1, Ordering::SeqCst);
    if !state.options.broadcast_delay.is_zero() {
        tokio::time::sleep(state.options.broadcast_delay).await;
    }
    state.send_all(format!("data: {msg}\n\n"));
    "ok"
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sseload=warn".into()),
        )
        .with_test_writer()
        .try_init();
}
