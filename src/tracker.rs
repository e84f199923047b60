//! Win/lose accounting for issued forecasts

use crate::types::{AccuracyCounters, Verdict};

/// Cumulative forecast scoring. Never decays or resets while the process runs.
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    counters: AccuracyCounters,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one forecast against the actual multiplier
    pub fn score(&mut self, actual: f64, predicted: f64) -> Verdict {
        let verdict = Verdict::judge(actual, predicted);

        match verdict {
            Verdict::Win => self.counters.win += 1,
            Verdict::Lose => self.counters.lose += 1,
        }
        self.counters.total = self.counters.win + self.counters.lose;
        self.counters.accuracy_pct = accuracy_pct(self.counters.win, self.counters.total);

        verdict
    }

    pub fn counters(&self) -> AccuracyCounters {
        self.counters
    }
}

fn accuracy_pct(win: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (win as f64 / total as f64 * 100.0).round() as u32
}
