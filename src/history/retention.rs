//! Retention bounds for the round history.

use chrono::Duration as ChronoDuration;

use super::TimeSeries;

/// Default number of rounds kept.
pub const DEFAULT_MAX_ROUNDS: usize = 24;

/// Count and/or age bound on retained rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub max_rounds: Option<usize>,
    pub max_age: Option<ChronoDuration>,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
            max_age: None,
        }
    }
}

impl Retention {
    pub fn rounds(max_rounds: usize) -> Self {
        Self {
            max_rounds: Some(max_rounds),
            max_age: None,
        }
    }

    /// Evict oldest rounds until the series is within bounds.
    ///
    /// Age is measured against the most recently appended round, and that
    /// round is never evicted. Returns the number of rounds removed.
    pub fn apply(&self, series: &mut TimeSeries) -> usize {
        let Some(newest) = series.latest().map(|r| r.timestamp) else {
            return 0;
        };
        let cutoff = self.max_age.map(|age| newest - age);

        let mut evicted = 0;
        while series.len() > 1 {
            let over_count = self.max_rounds.is_some_and(|max| series.len() > max);
            let too_old = match (cutoff, series.oldest()) {
                (Some(cutoff), Some(oldest)) => oldest.timestamp < cutoff,
                _ => false,
            };
            if !over_count && !too_old {
                break;
            }
            series.evict_oldest();
            evicted += 1;
        }
        evicted
    }
}
