//! Core domain types shared by the feed, engine and API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one finished round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Round identifier as sent by the feed
    pub session_id: String,
    /// Crash multiplier of the round (always positive)
    pub multiplier: f64,
}

impl Outcome {
    pub fn new(session_id: impl Into<String>, multiplier: f64) -> Self {
        Self {
            session_id: session_id.into(),
            multiplier,
        }
    }

    /// Id the following round is expected to carry.
    ///
    /// Display convenience only: the feed does not guarantee contiguous ids,
    /// and non-numeric ids have no successor.
    pub fn next_session_id(&self) -> Option<String> {
        self.session_id
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|id| id.checked_add(1))
            .map(|id| id.to_string())
    }
}

/// Forecast for the next round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Predicted multiplier, rounded to 2 decimals
    pub predicted_multiplier: f64,
    /// Confidence (0-100)
    pub confidence: u8,
    /// Human-readable reasoning
    pub rationale: String,
}

/// Whether a forecast held up against the actual result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Win,
    Lose,
}

impl Verdict {
    /// A forecast wins when the round reached at least the predicted multiplier
    pub fn judge(actual: f64, predicted: f64) -> Self {
        if actual >= predicted {
            Verdict::Win
        } else {
            Verdict::Lose
        }
    }

    pub fn is_win(self) -> bool {
        self == Verdict::Win
    }
}

/// A resolved forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Round that was current when the forecast was issued
    pub session_id: String,
    pub predicted_multiplier: f64,
    pub actual_multiplier: f64,
    pub verdict: Verdict,
    pub recorded_at: DateTime<Utc>,
}

/// Cumulative scoring since process start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccuracyCounters {
    pub total: u64,
    pub win: u64,
    pub lose: u64,
    /// round(win / total * 100), 0 when nothing was scored
    pub accuracy_pct: u32,
}
