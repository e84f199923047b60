//! Next-round forecasting
//!
//! The default [`PredictionEngine`] is a small decision table over the most
//! recent results. It is not a statistical model: the only memory it carries
//! between calls is a count of consecutive low rounds ("crash streak"),
//! which lives on the engine rather than being recomputed from history.

use crate::history::ResultHistory;
use crate::types::Forecast;

/// Rounds below this multiplier count towards the crash streak
pub const CRASH_THRESHOLD: f64 = 1.5;

/// Latest multiplier above which the engine turns conservative
pub const HIGH_MULTIPLIER: f64 = 5.0;

/// Streak length that triggers a rebound forecast
pub const STREAK_TRIGGER: u32 = 2;

/// Number of recent rounds averaged by the fallback rule
pub const AVERAGE_WINDOW: usize = 5;

/// Anything that can turn a result history into a forecast
pub trait ForecastModel: Send {
    /// Forecast the next round. May update internal state.
    fn forecast(&mut self, history: &ResultHistory) -> Forecast;

    /// Model name for logging
    fn name(&self) -> &str;
}

/// Heuristic forecaster with a carried crash-streak counter
#[derive(Debug, Clone, Default)]
pub struct PredictionEngine {
    /// Consecutive rounds below [`CRASH_THRESHOLD`], as of the last call
    streak: u32,
    /// Forecasts produced so far
    issued: u64,
}

impl PredictionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Forecast the next round from `history` (newest first).
    ///
    /// Rules are tried in order: not enough data, big win just seen, crash
    /// streak, then the recent average. The streak is updated from the
    /// latest round after the rule has been picked, so a streak-triggered
    /// forecast resets it before the latest round is counted.
    pub fn forecast(&mut self, history: &ResultHistory) -> Forecast {
        let latest = history.latest().map(|o| o.multiplier);

        let (predicted, confidence, rationale) = match latest {
            Some(last) if history.len() >= 2 => self.pick_rule(last, history),
            _ => (1.8, 20, "Insufficient data, need more rounds to analyse".to_string()),
        };

        match latest {
            Some(last) if last < CRASH_THRESHOLD => self.streak += 1,
            _ => self.streak = 0,
        }
        self.issued += 1;

        Forecast {
            predicted_multiplier: round2(predicted),
            confidence,
            rationale,
        }
    }

    fn pick_rule(&mut self, last: f64, history: &ResultHistory) -> (f64, u8, String) {
        if last > HIGH_MULTIPLIER {
            return (
                1.3,
                65,
                format!("After a high multiplier of {}x, playing safe with 1.3x", last),
            );
        }

        if self.streak >= STREAK_TRIGGER {
            let streak = self.streak;
            self.streak = 0;
            return (
                2.0,
                55,
                format!("After {} consecutive crashes, expecting a rebound to 2.0x", streak),
            );
        }

        let recent = history.recent(AVERAGE_WINDOW);
        let avg = recent.iter().map(|o| o.multiplier).sum::<f64>() / recent.len() as f64;

        if avg < 2.0 {
            (1.6, 45, format!("Low recent average ({:.1}x), predicting 1.6x", avg))
        } else {
            (1.4, 45, "High recent average, cautious 1.4x".to_string())
        }
    }
}

impl ForecastModel for PredictionEngine {
    fn forecast(&mut self, history: &ResultHistory) -> Forecast {
        PredictionEngine::forecast(self, history)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ResultHistory, HISTORY_CAPACITY};
    use crate::types::Outcome;

    /// History from multipliers listed newest first
    fn history(multipliers: &[f64]) -> ResultHistory {
        ResultHistory::from_newest_first(
            HISTORY_CAPACITY,
            multipliers
                .iter()
                .enumerate()
                .map(|(i, m)| Outcome::new((1000 - i).to_string(), *m)),
        )
    }

    #[test]
    fn test_insufficient_data() {
        for h in [history(&[]), history(&[3.0]), history(&[100.0])] {
            let mut engine = PredictionEngine::new();
            let forecast = engine.forecast(&h);
            assert_eq!(forecast.predicted_multiplier, 1.8);
            assert_eq!(forecast.confidence, 20);
        }
    }

    #[test]
    fn test_high_multiplier_wins_over_everything() {
        let mut engine = PredictionEngine::new();
        engine.streak = 5;

        let forecast = engine.forecast(&history(&[6.5, 1.0, 1.1, 1.2]));
        assert_eq!(forecast.predicted_multiplier, 1.3);
        assert_eq!(forecast.confidence, 65);
        assert!(forecast.rationale.contains("6.5"));
        // Latest round was not a crash
        assert_eq!(engine.streak(), 0);
    }

    #[test]
    fn test_high_multiplier_boundary() {
        let mut engine = PredictionEngine::new();
        // Exactly 5.0 is not "high"; falls through to the average rule
        let forecast = engine.forecast(&history(&[5.0, 1.0]));
        assert_eq!(forecast.predicted_multiplier, 1.4);
        assert_eq!(forecast.confidence, 45);
    }

    #[test]
    fn test_streak_triggers_rebound_and_resets() {
        let mut engine = PredictionEngine::new();
        let mut h = ResultHistory::results();

        h.append(Outcome::new("1", 1.2));
        engine.forecast(&h);
        assert_eq!(engine.streak(), 1);

        h.append(Outcome::new("2", 1.3));
        let second = engine.forecast(&h);
        assert_ne!(second.predicted_multiplier, 2.0);
        assert_eq!(engine.streak(), 2);

        h.append(Outcome::new("3", 3.0));
        let third = engine.forecast(&h);
        assert_eq!(third.predicted_multiplier, 2.0);
        assert_eq!(third.confidence, 55);
        assert!(third.rationale.contains('2'));
        assert_eq!(engine.streak(), 0);
    }

    #[test]
    fn test_streak_trigger_with_another_crash_restarts_count() {
        let mut engine = PredictionEngine::new();
        engine.streak = 2;

        let forecast = engine.forecast(&history(&[1.1, 1.2, 1.3]));
        assert_eq!(forecast.predicted_multiplier, 2.0);
        // Reset by the rule, then the latest crash is counted again
        assert_eq!(engine.streak(), 1);
    }

    #[test]
    fn test_low_average() {
        let mut engine = PredictionEngine::new();
        let forecast = engine.forecast(&history(&[1.8, 1.9, 2.0, 1.7, 1.6]));
        assert_eq!(forecast.predicted_multiplier, 1.6);
        assert_eq!(forecast.confidence, 45);
        assert!(forecast.rationale.contains("1.8x"));
    }

    #[test]
    fn test_high_average() {
        let mut engine = PredictionEngine::new();
        let forecast = engine.forecast(&history(&[2.5, 3.0, 1.5, 4.0, 2.0]));
        assert_eq!(forecast.predicted_multiplier, 1.4);
        assert_eq!(forecast.confidence, 45);
    }

    #[test]
    fn test_average_uses_only_five_most_recent() {
        let mut engine = PredictionEngine::new();
        // The last five average 1.6; the huge older round must be ignored
        let forecast = engine.forecast(&history(&[1.6, 1.6, 1.6, 1.6, 1.6, 500.0]));
        assert_eq!(forecast.predicted_multiplier, 1.6);
    }

    #[test]
    fn test_issued_counts_calls() {
        let mut engine = PredictionEngine::new();
        let h = history(&[2.0, 2.0]);
        engine.forecast(&h);
        engine.forecast(&h);
        assert_eq!(engine.issued(), 2);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(1.235_000_1), 1.24);
        assert_eq!(round2(2.0), 2.0);
    }
}
