//! Round execution: probe every target once, in order.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;

use crate::history::RoundRecord;
use crate::probe::{Latency, ProbeResult, Prober};
use crate::target::Target;

/// Whether a round stops at the first healthy target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundMode {
    /// Probe every target unconditionally.
    #[default]
    ProbeAll,
    /// Stop at the first reachable target; the rest are marked not probed.
    FirstHealthy,
}

impl FromStr for RoundMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "probe-all" => Ok(Self::ProbeAll),
            "first-healthy" | "first" => Ok(Self::FirstHealthy),
            other => Err(format!("unknown round mode: {}", other)),
        }
    }
}

impl fmt::Display for RoundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeAll => f.write_str("all"),
            Self::FirstHealthy => f.write_str("first-healthy"),
        }
    }
}

/// Per-round execution settings.
#[derive(Debug, Clone, Copy)]
pub struct RoundSettings {
    pub mode: RoundMode,
    /// Pause between consecutive probes.
    pub probe_delay: Duration,
    pub mask_addresses: bool,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            mode: RoundMode::ProbeAll,
            probe_delay: Duration::from_millis(300),
            mask_addresses: true,
        }
    }
}

/// Probe each target sequentially and seal the round.
pub async fn run_round<P: Prober>(prober: &P, targets: &[Target], settings: &RoundSettings) -> RoundRecord {
    let timestamp = Utc::now();
    let mut results = Vec::with_capacity(targets.len());
    let mut healthy_found = false;

    for (i, target) in targets.iter().enumerate() {
        if healthy_found {
            results.push(ProbeResult::not_probed(target.clone()));
            continue;
        }

        if i > 0 && !settings.probe_delay.is_zero() {
            tokio::time::sleep(settings.probe_delay).await;
        }

        let name = target.display_name(settings.mask_addresses);
        tracing::debug!("Probing {}", name);

        let measurement = prober.measure(target).await;
        let result = ProbeResult::from_measurement(target.clone(), &measurement);

        match (&result.latency, &measurement) {
            (Latency::Measured(ms), _) => tracing::info!("{}: {} ms", name, ms),
            (_, Err(e)) => tracing::warn!("{}: timeout / failure ({})", name, e),
            _ => tracing::warn!("{}: timeout / failure", name),
        }

        if result.ok() && settings.mode == RoundMode::FirstHealthy {
            healthy_found = true;
        }
        results.push(result);
    }

    RoundRecord::seal(timestamp, &results)
}
