//! Mock of the voting API.
//!
//! Accepts votes on `POST /api/v1/vote` the way the real service does, with knobs to slow it
//! down, fail a fixed share of votes or cap its throughput.
use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

pub const VOTE_ROUTE: &str = "/api/v1/vote";

/// Behaviour knobs. The default accepts every valid vote immediately.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Added before answering every request.
    pub delay: Duration,
    /// Answer every Nth request with 500.
    pub fail_every: Option<NonZeroU64>,
    /// Requests per second served before answering 503.
    pub capacity: Option<NonZeroU32>,
    /// Answer valid votes with this status instead of 202, without recording them.
    pub status: Option<StatusCode>,
}

impl MockConfig {
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = NonZeroU64::new(n);
        self
    }

    pub fn capacity(mut self, rps: u32) -> Self {
        self.capacity = NonZeroU32::new(rps);
        self
    }

    pub fn respond_with(mut self, status: u16) -> Self {
        self.status = StatusCode::from_u16(status).ok();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    #[serde(rename = "participanteId")]
    pub participant_id: i64,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoteAccepted {
    message: &'static str,
    vote_id: Uuid,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    details: String,
}

#[derive(Debug)]
enum Rejection {
    Payload(String),
    Invalid(&'static str),
    Injected(u64),
    OverCapacity,
    Internal(String),
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        use Rejection::*;
        let (status, error, details) = match self {
            Payload(details) => (StatusCode::BAD_REQUEST, "Invalid payload", details),
            Invalid(details) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Failed to process vote",
                details.to_string(),
            ),
            Injected(n) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process vote",
                format!("injected failure on request {n}"),
            ),
            OverCapacity => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Failed to process vote",
                "over capacity".to_string(),
            ),
            Internal(details) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error", details),
        };
        (status, Json(ErrorBody { error, details })).into_response()
    }
}

impl<T> From<PoisonError<T>> for Rejection {
    fn from(err: PoisonError<T>) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Shared state of a running mock. Clones share everything, so a handle kept by a test sees the
/// votes the server accepted.
#[derive(Clone)]
pub struct MockService {
    inner: Arc<Inner>,
}

struct Inner {
    config: MockConfig,
    limiter: Option<DefaultDirectRateLimiter>,
    requests: AtomicU64,
    votes: Mutex<Vec<Vote>>,
}

impl MockService {
    pub fn new(config: MockConfig) -> Self {
        let limiter = config.capacity.map(|rps| RateLimiter::direct(Quota::per_second(rps)));
        Self {
            inner: Arc::new(Inner {
                config,
                limiter,
                requests: AtomicU64::new(0),
                votes: Mutex::new(vec![]),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(VOTE_ROUTE, post(vote))
            .with_state(self.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Requests received so far, valid or not.
    pub fn requests(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }

    /// Votes answered with 202 so far.
    pub fn votes(&self) -> Vec<Vote> {
        self.inner
            .votes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[debug_handler]
async fn vote(
    State(service): State<MockService>,
    payload: Result<Json<Vote>, JsonRejection>,
) -> Result<(StatusCode, Json<VoteAccepted>), Rejection> {
    let inner = &service.inner;
    let n = inner.requests.fetch_add(1, Ordering::Relaxed) + 1;
    counter!("mock-service.requests").increment(1);

    if !inner.config.delay.is_zero() {
        tokio::time::sleep(inner.config.delay).await;
    }

    let Json(vote) = payload.map_err(|err| Rejection::Payload(err.body_text()))?;
    debug!(
        "Vote received: participanteId={}, sessionId={}",
        vote.participant_id, vote.session_id
    );

    // Zero values count as missing, like absent fields.
    if vote.participant_id == 0 {
        return Err(Rejection::Payload("participanteId is required".to_string()));
    }
    if vote.session_id.is_empty() {
        return Err(Rejection::Payload("sessionId is required".to_string()));
    }
    if vote.participant_id < 0 {
        return Err(Rejection::Invalid("participant id must be positive"));
    }

    if let Some(limiter) = &inner.limiter {
        if limiter.check().is_err() {
            return Err(Rejection::OverCapacity);
        }
    }

    if let Some(every) = inner.config.fail_every {
        if n % every.get() == 0 {
            return Err(Rejection::Injected(n));
        }
    }

    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| Rejection::Internal(err.to_string()))?;
    let status = match inner.config.status {
        Some(status) => status,
        None => {
            inner.votes.lock()?.push(vote);
            StatusCode::ACCEPTED
        }
    };

    Ok((
        status,
        Json(VoteAccepted {
            message: "Vote received",
            vote_id: Uuid::new_v4(),
            timestamp,
        }),
    ))
}

pub async fn serve(listener: TcpListener, service: MockService) -> std::io::Result<()> {
    axum::serve(listener, service.router()).await
}

/// Binds an ephemeral local port and serves the mock in the background.
pub async fn spawn(config: MockConfig) -> std::io::Result<(SocketAddr, MockService)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let service = MockService::new(config);

    let server = service.clone();
    tokio::spawn(async move {
        if let Err(err) = serve(listener, server).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });

    Ok((addr, service))
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Mock voting service listening on {}", listener.local_addr()?);
    serve(listener, MockService::new(config)).await?;
    Ok(())
}
