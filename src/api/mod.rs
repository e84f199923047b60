//! Read-only query API
//!
//! Serves the latest published [`SessionSnapshot`]. Handlers never touch the
//! coordinator; they only clone the current `Arc`.

pub mod responses;

pub use responses::{CheckReport, CurrentRound, ForecastView, HistoryRow, RecordRow, Tally};

use crate::error::Result;
use crate::feed::FeedStatus;
use crate::session::{SessionSnapshot, SnapshotReader};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// State shared across handlers
pub struct ApiState {
    snapshots: SnapshotReader,
    feed: Option<watch::Receiver<FeedStatus>>,
    history_default_limit: usize,
}

impl ApiState {
    pub fn new(snapshots: SnapshotReader, history_default_limit: usize) -> Self {
        Self {
            snapshots,
            feed: None,
            history_default_limit,
        }
    }

    /// Expose the feed connection status on /api/status
    pub fn with_feed_status(mut self, feed: watch::Receiver<FeedStatus>) -> Self {
        self.feed = Some(feed);
        self
    }

    fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Missing, unparsable and non-positive limits fall back to the default
    fn history_limit(&self, raw: Option<&str>) -> usize {
        raw.and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(self.history_default_limit)
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<String>,
}

// ============ HTTP API Handlers ============

/// Current round and pending forecast
async fn get_current(State(state): State<Arc<ApiState>>) -> Json<CurrentRound> {
    Json(CurrentRound::from(state.snapshot().as_ref()))
}

/// Recent results, newest first
async fn get_history(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<HistoryRow>> {
    let limit = state.history_limit(params.limit.as_deref());
    let snapshot = state.snapshot();
    Json(snapshot.history.iter().take(limit).map(HistoryRow::from).collect())
}

/// Win/lose tally and recent forecast outcomes
async fn get_check(State(state): State<Arc<ApiState>>) -> Json<CheckReport> {
    Json(CheckReport::from(state.snapshot().as_ref()))
}

/// Feed connection status
async fn get_status(State(state): State<Arc<ApiState>>) -> Json<FeedStatus> {
    let status = state
        .feed
        .as_ref()
        .map(|feed| feed.borrow().clone())
        .unwrap_or_default();
    Json(status)
}

/// Health check
async fn health_check() -> &'static str {
    "OK"
}

/// Create API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api", get(get_current))
        .route("/api/history", get(get_history))
        .route("/api/check", get(get_check))
        .route("/api/status", get(get_status))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve<F>(state: ApiState, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🚀 Query API listening on http://{}", listener.local_addr()?);
    tracing::info!("   GET  /api           - current round and forecast");
    tracing::info!("   GET  /api/history   - result history");
    tracing::info!("   GET  /api/check     - forecast accuracy");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
