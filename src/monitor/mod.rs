//! Monitor module: the bounded round loop.
//!
//! Each round is probed, appended to history and folded into the failure
//! state. The loop ends when the round budget runs out, when a healthy round
//! is seen (if configured), or once the failure threshold triggers
//! remediation. The report is rendered after the loop in every case.

mod detector;
mod round;

#[cfg(test)]
pub(crate) mod testing;

pub use detector::*;
pub use round::*;

use std::path::PathBuf;
use std::time::Duration;

use crate::history::HistoryStore;
use crate::probe::Prober;
use crate::remediation::{remediate, ControlPlane, RemediationError, RestartDispatch};
use crate::report::{render_report, write_report, ReportOptions};
use crate::target::{Credentials, Target};

/// Loop-level settings.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub round: RoundSettings,
    pub max_rounds: u32,
    /// Pause between rounds.
    pub round_interval: Duration,
    /// Consecutive all-failed rounds before remediation.
    pub failure_threshold: u32,
    /// End the run on the first round with a reachable target.
    pub stop_on_healthy: bool,
    /// Where to write the report; `None` disables it.
    pub report_path: Option<PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            round: RoundSettings::default(),
            max_rounds: 1,
            round_interval: Duration::from_secs(30),
            failure_threshold: 3,
            stop_on_healthy: false,
            report_path: None,
        }
    }
}

/// Who to restart and how to log in.
pub struct Remediation<C> {
    pub control_plane: C,
    pub control_target: Target,
    pub credentials: Credentials,
}

/// Why the loop stopped.
#[derive(Debug)]
pub enum Termination {
    BudgetExhausted,
    Healthy,
    /// Threshold reached with no control plane configured.
    ThresholdReached,
    /// Threshold reached and remediation attempted.
    Remediated(Result<RestartDispatch, RemediationError>),
}

/// What happened during a run.
#[derive(Debug)]
pub struct RunSummary {
    pub rounds: u32,
    pub termination: Termination,
    pub state: FailureState,
    /// Aggregate failure counter after each round.
    pub aggregate_failures: Vec<u32>,
}

/// The round loop with its owned store and collaborators.
pub struct Monitor<P, C> {
    targets: Vec<Target>,
    prober: P,
    store: HistoryStore,
    remediation: Option<Remediation<C>>,
    settings: MonitorSettings,
}

impl<P: Prober, C: ControlPlane> Monitor<P, C> {
    pub fn new(
        targets: Vec<Target>,
        prober: P,
        store: HistoryStore,
        remediation: Option<Remediation<C>>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            targets,
            prober,
            store,
            remediation,
            settings,
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Run rounds until the loop terminates, then render the report.
    pub async fn run(&mut self) -> RunSummary {
        let settings = self.settings.clone();
        let mut state = FailureState::new();
        let mut aggregate_failures = Vec::new();
        let mut termination = Termination::BudgetExhausted;
        let mut rounds = 0;

        tracing::info!(
            "Monitoring {} targets for up to {} rounds (threshold {})",
            self.targets.len(),
            settings.max_rounds,
            settings.failure_threshold
        );

        for round in 1..=settings.max_rounds {
            if round > 1 && !settings.round_interval.is_zero() {
                tokio::time::sleep(settings.round_interval).await;
            }

            tracing::info!("Round {}/{} started", round, settings.max_rounds);
            let record = run_round(&self.prober, &self.targets, &settings.round).await;
            let healthy = record.any_ok();

            let (next, observation) = state.observe(&record, settings.failure_threshold);
            state = next;
            aggregate_failures.push(state.consecutive_aggregate_failures);
            rounds = round;

            self.store.append(record);

            match observation.health {
                AggregateHealth::Healthy => tracing::info!("Round {}: healthy", round),
                AggregateHealth::Degraded(n) => tracing::warn!(
                    "Round {}: all targets failed ({}/{} consecutive)",
                    round,
                    n,
                    settings.failure_threshold
                ),
                AggregateHealth::Critical(n) => tracing::error!(
                    "Round {}: all targets failed for {} consecutive rounds",
                    round,
                    n
                ),
                AggregateHealth::Remediated => {}
            }

            if observation.remediate {
                termination = self.remediate().await;
                break;
            }

            if healthy && settings.stop_on_healthy {
                termination = Termination::Healthy;
                break;
            }
        }

        self.write_report();

        RunSummary {
            rounds,
            termination,
            state,
            aggregate_failures,
        }
    }

    async fn remediate(&self) -> Termination {
        let Some(remediation) = &self.remediation else {
            tracing::error!("Failure threshold reached but no control credentials are configured");
            return Termination::ThresholdReached;
        };

        let name = remediation
            .control_target
            .display_name(self.settings.round.mask_addresses);
        tracing::warn!("Failure threshold reached, remediating via {}", name);

        let result = remediate(
            &remediation.control_plane,
            &remediation.control_target,
            &remediation.credentials,
        )
        .await;

        if let Err(e) = &result {
            tracing::error!("Remediation via {} failed: {}", name, e);
        }

        Termination::Remediated(result)
    }

    fn write_report(&self) {
        let Some(path) = &self.settings.report_path else {
            return;
        };

        let options = ReportOptions {
            mask_addresses: self.settings.round.mask_addresses,
        };
        let body = render_report(self.store.series(), &self.targets, &options);

        match write_report(path, &body) {
            Ok(()) => tracing::info!("Report written to {}", path.display()),
            Err(e) => tracing::error!("Failed to write report to {}: {}", path.display(), e),
        }
    }
}
