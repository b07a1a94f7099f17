//! In-process HTTP file server for tests: HEAD probing, ranged GET and fault injection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadMode {
    WithLength,
    NoAcceptRanges,
    NoLength,
    NotFound,
    Hang,
}

/// Fault injected into ranged GETs starting at a given offset.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Respond with `status` for the next `times` requests.
    Status { status: StatusCode, times: usize },
    /// Respond 206 with only half of the requested bytes.
    Truncate,
    /// Never respond.
    Hang,
    /// Send half of the range, then drop the connection, for the next `times` requests.
    Reset { times: usize },
    /// Send half of the range, then stall forever.
    Stall,
}

pub struct ServerState {
    pub body: Bytes,
    head_mode: Mutex<HeadMode>,
    faults: Mutex<HashMap<u64, Fault>>,
    attempts: Mutex<HashMap<u64, usize>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub head_requests: AtomicUsize,
    pub range_requests: AtomicUsize,
    pub full_requests: AtomicUsize,
}

impl ServerState {
    pub fn set_head_mode(&self, mode: HeadMode) {
        *self.head_mode.lock().unwrap() = mode;
    }

    pub fn inject(&self, start: u64, fault: Fault) {
        self.faults.lock().unwrap().insert(start, fault);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Ranged GET attempts received for the range starting at `start`.
    pub fn attempts(&self, start: u64) -> usize {
        self.attempts.lock().unwrap().get(&start).copied().unwrap_or_default()
    }

    fn take_fault(&self, start: u64) -> Option<Fault> {
        let mut faults = self.faults.lock().unwrap();
        let fault = faults.get(&start).copied()?;
        let remaining = match fault {
            Fault::Status { status, times } => Some((times, Fault::Status { status, times: times.saturating_sub(1) })),
            Fault::Reset { times } => Some((times, Fault::Reset { times: times.saturating_sub(1) })),
            Fault::Truncate | Fault::Hang | Fault::Stall => None,
        };
        match remaining {
            Some((times, _)) if times <= 1 => {
                faults.remove(&start);
            }
            Some((_, next)) => {
                faults.insert(start, next);
            }
            None => {}
        }

        Some(fault)
    }
}

struct InFlight(Arc<ServerState>);

impl InFlight {
    fn enter(state: &Arc<ServerState>) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

impl TestServer {
    pub async fn start(body: Bytes) -> Self {
        let state = Arc::new(ServerState {
            body,
            head_mode: Mutex::new(HeadMode::WithLength),
            faults: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            head_requests: AtomicUsize::new(0),
            range_requests: AtomicUsize::new(0),
            full_requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/file", get(get_file).head(head_file))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}/file", self.addr)).unwrap()
    }

    pub fn pattern_body(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
    }
}

async fn head_file(State(state): State<Arc<ServerState>>) -> Response {
    state.head_requests.fetch_add(1, Ordering::SeqCst);
    let len = state.body.len().to_string();
    let mode = *state.head_mode.lock().unwrap();

    match mode {
        HeadMode::WithLength => (
            StatusCode::OK,
            [(header::CONTENT_LENGTH, len), (header::ACCEPT_RANGES, "bytes".to_string())],
        ).into_response(),
        HeadMode::NoAcceptRanges => (StatusCode::OK, [(header::CONTENT_LENGTH, len)]).into_response(),
        HeadMode::NoLength => StatusCode::OK.into_response(),
        HeadMode::NotFound => StatusCode::NOT_FOUND.into_response(),
        HeadMode::Hang => std::future::pending().await,
    }
}

async fn get_file(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let total = state.body.len() as u64;
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_range);

    let Some((start, end)) = range else {
        state.full_requests.fetch_add(1, Ordering::SeqCst);
        return (StatusCode::OK, state.body.clone()).into_response();
    };

    state.range_requests.fetch_add(1, Ordering::SeqCst);
    *state.attempts.lock().unwrap().entry(start).or_default() += 1;
    let _in_flight = InFlight::enter(&state);

    let delay = *state.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if start > end || end >= total {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }

    let content_range = format!("bytes {start}-{end}/{total}");
    let half = state.body.slice(start as usize..=(start + (end - start) / 2) as usize);

    match state.take_fault(start) {
        Some(Fault::Status { status, .. }) => status.into_response(),
        Some(Fault::Hang) => std::future::pending().await,
        Some(Fault::Truncate) => {
            (StatusCode::PARTIAL_CONTENT, [(header::CONTENT_RANGE, content_range)], half).into_response()
        }
        Some(Fault::Reset { .. }) => {
            let parts: Vec<Result<Bytes, std::io::Error>> = vec![Ok(half), Err(std::io::Error::other("connection reset"))];
            partial_stream(content_range, end - start + 1, Body::from_stream(stream::iter(parts)))
        }
        Some(Fault::Stall) => {
            let parts = stream::iter([Ok::<_, std::io::Error>(half)]).chain(stream::pending());
            partial_stream(content_range, end - start + 1, Body::from_stream(parts))
        }
        None => {
            let body = state.body.slice(start as usize..=end as usize);
            (StatusCode::PARTIAL_CONTENT, [(header::CONTENT_RANGE, content_range)], body).into_response()
        }
    }
}

fn partial_stream(content_range: String, len: u64, body: Body) -> Response {
    (
        StatusCode::PARTIAL_CONTENT,
        [(header::CONTENT_RANGE, content_range), (header::CONTENT_LENGTH, len.to_string())],
        body,
    ).into_response()
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}
