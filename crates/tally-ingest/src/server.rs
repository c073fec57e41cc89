//! Axum HTTP collector.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Serialize;
use tally_sync::SessionDelta;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::ledger::{Ledger, LedgerStats, Receipt, SessionView};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Accepted deliveries.
    pub ledger: Arc<Ledger>,
    /// Required bearer token, if any.
    pub bearer_token: Option<Arc<str>>,
    /// When the collector started.
    pub start_time: Instant,
}

/// Reply to an accepted or duplicate delivery.
#[derive(Debug, Serialize)]
pub struct IngestAck {
    /// Always `true`; the delta is safe to consider delivered.
    pub acked: bool,
    /// The delta had already been recorded.
    pub duplicate: bool,
}

/// `GET /health` body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the collector is running.
    pub status: &'static str,
    /// Seconds since the collector started.
    pub uptime_secs: u64,
    /// Ledger counters.
    #[serde(flatten)]
    pub stats: LedgerStats,
}

/// The collector.
pub struct IngestServer {
    config: IngestConfig,
    ledger: Arc<Ledger>,
    start_time: Instant,
}

impl IngestServer {
    /// Create a collector with an empty ledger.
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            ledger: Arc::new(Ledger::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            ledger: self.ledger.clone(),
            bearer_token: self.config.bearer_token.as_deref().map(Arc::from),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ingest", post(ingest_handler))
            .route("/health", get(health_handler))
            .route("/sessions", get(sessions_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .with_state(state)
    }

    /// Get the ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Get the collector configuration.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Bind and serve until `shutdown` is cancelled.
    pub async fn start(&self, shutdown: CancellationToken) -> std::io::Result<ServerHandle> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();

        info!(addr = %local_addr, "collector listening");

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if let Err(e) = served {
                warn!(error = %e, "collector stopped with error");
            }
        });

        Ok(ServerHandle {
            port: local_addr.port(),
            task,
        })
    }
}

/// Handle returned by [`IngestServer::start`].
pub struct ServerHandle {
    /// Bound port.
    pub port: u16,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// `http://127.0.0.1:<port>/ingest`.
    pub fn ingest_url(&self) -> String {
        format!("http://127.0.0.1:{}/ingest", self.port)
    }

    /// Wait for the serve task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// POST /ingest
async fn ingest_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(expected) = state.bearer_token.as_deref() {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected) {
            return (StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response();
        }
    }

    let delta: SessionDelta = match serde_json::from_slice(&body) {
        Ok(delta) => delta,
        Err(e) => {
            warn!(error = %e, "rejecting malformed delta");
            return (StatusCode::BAD_REQUEST, format!("invalid delta: {e}")).into_response();
        }
    };

    let receipt = state.ledger.record(&delta);
    match receipt {
        Receipt::Accepted => info!(
            device_uuid = %delta.device_uuid,
            session_start = %delta.session_start,
            run_seconds = delta.run_seconds,
            status = delta.status.as_str(),
            "delta accepted"
        ),
        Receipt::Duplicate => debug!(msg_id = %delta.msg_id, "duplicate delta"),
    }

    Json(IngestAck {
        acked: true,
        duplicate: receipt == Receipt::Duplicate,
    })
    .into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        stats: state.ledger.stats(),
    })
}

/// GET /sessions
async fn sessions_handler(State(state): State<AppState>) -> Json<Vec<SessionView>> {
    Json(state.ledger.sessions())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
