//! JSON payloads of the query API
//!
//! Field names and labels are the public wire contract consumed by existing
//! clients, so they stay in Vietnamese.

use crate::session::SessionSnapshot;
use crate::types::{Forecast, Outcome, PredictionRecord, Verdict};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rationale shown before the first forecast exists
pub const ANALYZING: &str = "Đang phân tích...";

/// Status label at or above 50% accuracy
pub const HOT_STREAK: &str = "🔥 ĐANG ĂN NGON";

/// Status label below 50% accuracy
pub const CAUTION: &str = "💸 CẨN THẬN";

/// Resolved forecasts included in /api/check
pub const RECENT_RECORDS: usize = 15;

/// `GET /api`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentRound {
    #[serde(rename = "phien")]
    pub session_id: Option<String>,
    #[serde(rename = "ket_qua")]
    pub multiplier: Option<f64>,
    #[serde(rename = "phien_hien_tai")]
    pub next_session_id: Option<String>,
    #[serde(rename = "du_doan")]
    pub prediction: Option<f64>,
    #[serde(rename = "li_do")]
    pub rationale: String,
}

impl From<&SessionSnapshot> for CurrentRound {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.current.as_ref().map(|o| o.session_id.clone()),
            multiplier: snapshot.current.as_ref().map(|o| o.multiplier),
            next_session_id: snapshot.next_session_id.clone(),
            prediction: snapshot.forecast.as_ref().map(|f| f.predicted_multiplier),
            rationale: snapshot
                .forecast
                .as_ref()
                .map(|f| f.rationale.clone())
                .unwrap_or_else(|| ANALYZING.to_string()),
        }
    }
}

/// One row of `GET /api/history`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    #[serde(rename = "phien")]
    pub session_id: String,
    #[serde(rename = "ket_qua")]
    pub multiplier: f64,
}

impl From<&Outcome> for HistoryRow {
    fn from(outcome: &Outcome) -> Self {
        Self {
            session_id: outcome.session_id.clone(),
            multiplier: outcome.multiplier,
        }
    }
}

/// `GET /api/check`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    #[serde(rename = "thong_ke")]
    pub tally: Tally,
    #[serde(rename = "lich_su_gan_day")]
    pub recent: Vec<RecordRow>,
    #[serde(rename = "du_doan_hien_tai")]
    pub current_forecast: Option<ForecastView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tally {
    #[serde(rename = "tong_so_tay")]
    pub total: u64,
    #[serde(rename = "an_duoc")]
    pub win: u64,
    #[serde(rename = "bu_tay")]
    pub lose: u64,
    /// e.g. "67%"
    #[serde(rename = "ti_le_an")]
    pub accuracy: String,
    #[serde(rename = "trang_thai")]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRow {
    #[serde(rename = "phien")]
    pub session_id: String,
    #[serde(rename = "du_doan")]
    pub predicted: f64,
    #[serde(rename = "ket_qua")]
    pub actual: f64,
    #[serde(rename = "trang_thai")]
    pub verdict: String,
    #[serde(rename = "thoi_gian")]
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastView {
    /// e.g. "1.6x"
    #[serde(rename = "du_doan")]
    pub prediction: String,
    /// e.g. "45%"
    #[serde(rename = "do_tin_cay")]
    pub confidence: String,
    #[serde(rename = "ly_do")]
    pub rationale: String,
}

pub fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Win => "ĂN",
        Verdict::Lose => "BÚ",
    }
}

impl From<&PredictionRecord> for RecordRow {
    fn from(record: &PredictionRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            predicted: record.predicted_multiplier,
            actual: record.actual_multiplier,
            verdict: verdict_label(record.verdict).to_string(),
            recorded_at: record.recorded_at,
        }
    }
}

impl From<&Forecast> for ForecastView {
    fn from(forecast: &Forecast) -> Self {
        Self {
            prediction: format!("{}x", forecast.predicted_multiplier),
            confidence: format!("{}%", forecast.confidence),
            rationale: forecast.rationale.clone(),
        }
    }
}

impl From<&SessionSnapshot> for CheckReport {
    fn from(snapshot: &SessionSnapshot) -> Self {
        let accuracy = snapshot.accuracy;
        let status = if accuracy.accuracy_pct >= 50 {
            HOT_STREAK
        } else {
            CAUTION
        };

        Self {
            tally: Tally {
                total: accuracy.total,
                win: accuracy.win,
                lose: accuracy.lose,
                accuracy: format!("{}%", accuracy.accuracy_pct),
                status: status.to_string(),
            },
            recent: snapshot
                .records
                .iter()
                .take(RECENT_RECORDS)
                .map(RecordRow::from)
                .collect(),
            current_forecast: snapshot.forecast.as_ref().map(ForecastView::from),
        }
    }
}
