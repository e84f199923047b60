//! Per-result bookkeeping and snapshot publication
//!
//! ```text
//! Outcome ─► score pending forecast ─► append history ─► forecast next ─► publish
//! ```
//!
//! The coordinator is owned by a single task. Readers only ever see the
//! `Arc<SessionSnapshot>` published at the end of a completed [`observe`].
//!
//! [`observe`]: SessionCoordinator::observe

use crate::engine::{ForecastModel, PredictionEngine};
use crate::history::{PredictionLog, ResultHistory};
use crate::tracker::AccuracyTracker;
use crate::types::{AccuracyCounters, Forecast, Outcome, PredictionRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Read side of the published state
pub type SnapshotReader = watch::Receiver<Arc<SessionSnapshot>>;

/// Immutable view of the session state after a completed update
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Most recent round
    pub current: Option<Outcome>,
    /// Display-only guess of the upcoming round id
    pub next_session_id: Option<String>,
    /// Forecast awaiting the next result
    pub forecast: Option<Forecast>,
    pub accuracy: AccuracyCounters,
    /// Round results, newest first
    pub history: Vec<Outcome>,
    /// Resolved forecasts, newest first
    pub records: Vec<PredictionRecord>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Glues history, engine and tracker together
pub struct SessionCoordinator<M: ForecastModel = PredictionEngine> {
    model: M,
    tracker: AccuracyTracker,
    history: ResultHistory,
    records: PredictionLog,
    current: Option<Outcome>,
    pending: Option<Forecast>,
    publisher: watch::Sender<Arc<SessionSnapshot>>,
}

impl SessionCoordinator<PredictionEngine> {
    /// Coordinator with the default heuristic engine
    pub fn new() -> (Self, SnapshotReader) {
        Self::with_model(PredictionEngine::new())
    }
}

impl<M: ForecastModel> SessionCoordinator<M> {
    pub fn with_model(model: M) -> (Self, SnapshotReader) {
        let (publisher, reader) = watch::channel(Arc::new(SessionSnapshot::default()));
        let coordinator = Self {
            model,
            tracker: AccuracyTracker::new(),
            history: ResultHistory::results(),
            records: PredictionLog::records(),
            current: None,
            pending: None,
            publisher,
        };
        (coordinator, reader)
    }

    /// Another reader of the published snapshots
    pub fn subscribe(&self) -> SnapshotReader {
        self.publisher.subscribe()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn pending(&self) -> Option<&Forecast> {
        self.pending.as_ref()
    }

    pub fn history(&self) -> &ResultHistory {
        &self.history
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.publisher.borrow().clone()
    }

    /// Run one full update for a freshly observed round.
    ///
    /// Duplicate session ids (e.g. the same result returned by a poll and a
    /// push) are processed like any other round.
    pub fn observe(&mut self, outcome: Outcome) -> Arc<SessionSnapshot> {
        info!("📊 Session {}: {}x", outcome.session_id, outcome.multiplier);

        if let Some(pending) = self.pending.take() {
            let verdict = self
                .tracker
                .score(outcome.multiplier, pending.predicted_multiplier);
            // Filed under the round that was current when the forecast was issued
            let session_id = self
                .current
                .as_ref()
                .map_or_else(|| outcome.session_id.clone(), |c| c.session_id.clone());
            self.records.append(PredictionRecord {
                session_id,
                predicted_multiplier: pending.predicted_multiplier,
                actual_multiplier: outcome.multiplier,
                verdict,
                recorded_at: Utc::now(),
            });
        }

        self.current = Some(outcome.clone());
        self.history.append(outcome);

        let forecast = self.model.forecast(&self.history);
        let counters = self.tracker.counters();
        info!(
            "🎯 Next forecast: {}x ({}% confidence, {}) | {}",
            forecast.predicted_multiplier,
            forecast.confidence,
            self.model.name(),
            forecast.rationale
        );
        info!(
            "📈 Tally: {} win / {} lose ({}%)",
            counters.win, counters.lose, counters.accuracy_pct
        );
        self.pending = Some(forecast);

        self.publish()
    }

    fn publish(&self) -> Arc<SessionSnapshot> {
        let snapshot = Arc::new(SessionSnapshot {
            current: self.current.clone(),
            next_session_id: self.current.as_ref().and_then(Outcome::next_session_id),
            forecast: self.pending.clone(),
            accuracy: self.tracker.counters(),
            history: self.history.to_vec(),
            records: self.records.to_vec(),
            updated_at: Some(Utc::now()),
        });
        self.publisher.send_replace(snapshot.clone());
        snapshot
    }
}
