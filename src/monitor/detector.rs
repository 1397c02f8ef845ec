//! Consecutive-failure tracking.
//!
//! `FailureState` is a plain value: each sealed round is folded into it by
//! `observe`, which returns the next state and what the run loop should do.

use std::collections::HashMap;

use crate::history::RoundRecord;
use crate::probe::Latency;

/// Aggregate health after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateHealth {
    /// At least one target answered in the latest round.
    Healthy,
    /// Every target failed for `n` rounds in a row, below the threshold.
    Degraded(u32),
    /// Every target failed for `n >= threshold` rounds in a row.
    Critical(u32),
    /// Remediation has been attempted; terminal for the process.
    Remediated,
}

/// Result of folding one round into the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub health: AggregateHealth,
    /// Set exactly once per process, on the first entry into `Critical`.
    pub remediate: bool,
}

/// Failure counters for one run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureState {
    pub consecutive_aggregate_failures: u32,
    pub per_target_failures: HashMap<String, u32>,
    pub remediation_fired: bool,
}

impl FailureState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a sealed round into the state.
    pub fn observe(mut self, record: &RoundRecord, threshold: u32) -> (Self, Observation) {
        if self.remediation_fired {
            let observation = Observation {
                health: AggregateHealth::Remediated,
                remediate: false,
            };
            return (self, observation);
        }

        for entry in &record.entries {
            match entry.latency {
                Latency::Measured(_) => {
                    self.per_target_failures.insert(entry.label.clone(), 0);
                }
                Latency::Failed => {
                    *self.per_target_failures.entry(entry.label.clone()).or_insert(0) += 1;
                }
                Latency::NotProbed => {}
            }
        }

        if record.any_ok() {
            self.consecutive_aggregate_failures = 0;
            let observation = Observation {
                health: AggregateHealth::Healthy,
                remediate: false,
            };
            return (self, observation);
        }

        self.consecutive_aggregate_failures += 1;
        let n = self.consecutive_aggregate_failures;

        let observation = if n >= threshold {
            self.remediation_fired = true;
            Observation {
                health: AggregateHealth::Critical(n),
                remediate: true,
            }
        } else {
            Observation {
                health: AggregateHealth::Degraded(n),
                remediate: false,
            }
        };

        (self, observation)
    }

    /// Current aggregate health for the given threshold.
    pub fn health(&self, threshold: u32) -> AggregateHealth {
        match self.consecutive_aggregate_failures {
            _ if self.remediation_fired => AggregateHealth::Remediated,
            0 => AggregateHealth::Healthy,
            n if n >= threshold => AggregateHealth::Critical(n),
            n => AggregateHealth::Degraded(n),
        }
    }

    pub fn target_failures(&self, label: &str) -> u32 {
        self.per_target_failures.get(label).copied().unwrap_or(0)
    }
}
