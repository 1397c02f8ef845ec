//! VaporWatch - latency monitor with automatic remediation
//!
//! Probes a set of endpoints in bounded rounds, keeps a rolling JSON history,
//! renders a Markdown report and restarts a control target once every
//! endpoint has been down for too long.

mod config;
mod history;
mod monitor;
mod probe;
mod remediation;
mod report;
mod target;

#[cfg(test)]
mod test_support;

use config::MonitorConfig;
use history::HistoryStore;
use monitor::{Monitor, Remediation, Termination};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("vaporwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = match MonitorConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!(
        "Starting VaporWatch with {} targets using the {} strategy",
        cfg.targets.len(),
        cfg.strategy
    );
    tracing::info!("Using history at {}", cfg.history_path.display());

    let store = HistoryStore::open(&cfg.history_path, cfg.retention);

    let remediation = cfg
        .control_plane()
        .map(|(control_plane, control_target, credentials)| Remediation {
            control_plane,
            control_target,
            credentials,
        });
    if remediation.is_none() {
        tracing::info!("No control credentials configured, remediation disabled");
    }

    let mut monitor = Monitor::new(
        cfg.targets.clone(),
        cfg.probe_config(),
        store,
        remediation,
        cfg.monitor_settings(),
    );
    let summary = monitor.run().await;

    tracing::info!(
        "Final health {:?}, {} rounds retained in {}",
        summary.state.health(cfg.failure_threshold),
        monitor.store().series().len(),
        monitor.store().path().display()
    );
    for target in &cfg.targets {
        let streak = summary.state.target_failures(&target.label);
        if streak > 0 {
            tracing::warn!(
                "{} failed its last {} probes",
                target.display_name(cfg.mask_addresses),
                streak
            );
        }
    }

    match &summary.termination {
        Termination::BudgetExhausted => {
            tracing::info!("Finished after {} rounds", summary.rounds)
        }
        Termination::Healthy => {
            tracing::info!("Healthy round seen after {} rounds, stopping", summary.rounds)
        }
        Termination::ThresholdReached => tracing::warn!(
            "Stopped after {} rounds: threshold reached without remediation",
            summary.rounds
        ),
        Termination::Remediated(Ok(dispatch)) => {
            tracing::info!("Restart dispatched after {} rounds: {:?}", summary.rounds, dispatch)
        }
        Termination::Remediated(Err(e)) => {
            tracing::error!("Remediation failed after {} rounds: {}", summary.rounds, e)
        }
    }

    Ok(())
}
