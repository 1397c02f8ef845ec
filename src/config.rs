//! Configuration module for vaporwatch.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unlike a long-running server, a monitor with a bad target list or half a
//! credential pair must not start, so malformed values are errors.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use thiserror::Error;

use crate::history::{Retention, DEFAULT_MAX_ROUNDS};
use crate::monitor::{MonitorSettings, RoundMode, RoundSettings};
use crate::probe::{ProbeConfig, StatusPolicy, Strategy, DEFAULT_PROXY_CHECK_URL};
use crate::remediation::{HttpControlPlane, DEFAULT_LOGIN_PATH, DEFAULT_RESTART_PATH};
use crate::target::{parse_target_list, Credentials, Target, TargetParseError};

/// Configuration errors. All are fatal at startup.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("no targets configured (set VAPORWATCH_TARGETS)")]
    NoTargets,
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] TargetParseError),
    #[error("target {0} is configured more than once")]
    DuplicateTarget(String),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("{0} is set but {1} is missing")]
    MissingCredential(&'static str, &'static str),
    #[error("control target index {index} is out of range for {count} targets")]
    ControlTargetOutOfRange { index: usize, count: usize },
}

/// Control-plane settings; present only when credentials are configured.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub credentials: Credentials,
    pub control_index: usize,
    pub login_path: String,
    pub restart_path: String,
    pub timeout: Duration,
}

/// Monitor configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub targets: Vec<Target>,
    pub strategy: Strategy,
    /// Port for targets given without one (default: 443)
    pub default_port: u16,
    /// Hard per-probe timeout (default: 5s)
    pub timeout: Duration,
    /// Pause between probes within a round (default: 300ms)
    pub probe_delay: Duration,
    /// Pause between rounds (default: 30s)
    pub round_interval: Duration,
    /// Round budget (default: 1)
    pub max_rounds: u32,
    /// Consecutive all-failed rounds before remediation (default: 3)
    pub failure_threshold: u32,
    pub round_mode: RoundMode,
    pub stop_on_healthy: bool,
    pub status_policy: StatusPolicy,
    /// Proxy for the http strategy
    pub proxy: Option<String>,
    pub proxy_check_url: String,
    /// History file (default: "ui_history.json")
    pub history_path: PathBuf,
    pub retention: Retention,
    /// Report file (default: "README.md"); `None` disables the report
    pub report_path: Option<PathBuf>,
    pub mask_addresses: bool,
    pub control: Option<ControlConfig>,
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `VAPORWATCH_TARGETS`: comma-separated targets (fallbacks: `BASE_URL`, `SOCKS5_INFO`)
    /// - `VAPORWATCH_STRATEGY`: tcp, tls, http or proxy (default: http)
    /// - `VAPORWATCH_DEFAULT_PORT`, `VAPORWATCH_TIMEOUT_MS`, `VAPORWATCH_PROBE_DELAY_MS`
    /// - `VAPORWATCH_ROUND_INTERVAL_SECS`, `VAPORWATCH_MAX_ROUNDS`, `VAPORWATCH_FAILURE_THRESHOLD`
    /// - `VAPORWATCH_ROUND_MODE`: all or first-healthy (default: all)
    /// - `VAPORWATCH_STOP_ON_HEALTHY`, `VAPORWATCH_HTTP_STATUS` (any or success)
    /// - `VAPORWATCH_PROXY`, `VAPORWATCH_PROXY_CHECK_URL`
    /// - `VAPORWATCH_HISTORY_PATH`, `VAPORWATCH_HISTORY_MAX_ROUNDS`, `VAPORWATCH_HISTORY_MAX_AGE_SECS`
    /// - `VAPORWATCH_REPORT_PATH` (empty disables), `VAPORWATCH_MASK_ADDRESSES`
    /// - `VAPORWATCH_USERNAME`, `VAPORWATCH_PASSWORD`, `VAPORWATCH_CONTROL_TARGET`
    /// - `VAPORWATCH_LOGIN_PATH`, `VAPORWATCH_RESTART_PATH`, `VAPORWATCH_CONTROL_TIMEOUT_MS`
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let default_port = vars.positive("VAPORWATCH_DEFAULT_PORT", 443u16)?;

        let (raw_targets, default_strategy) = match (
            vars.get("VAPORWATCH_TARGETS"),
            vars.get("BASE_URL"),
            vars.get("SOCKS5_INFO"),
        ) {
            (Some(t), _, _) => (t, Strategy::Http),
            (None, Some(t), _) => (t, Strategy::Http),
            (None, None, Some(t)) => (t, Strategy::Proxy),
            (None, None, None) => return Err(ConfigError::NoTargets),
        };
        let targets = parse_target_list(&raw_targets, default_port)?;
        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        // Targets are equal by host and port; each must appear once per round
        {
            let mut seen = HashSet::new();
            if let Some(dup) = targets.iter().find(|t| !seen.insert(*t)) {
                return Err(ConfigError::DuplicateTarget(dup.authority()));
            }
        }

        let strategy = vars.parsed("VAPORWATCH_STRATEGY", default_strategy)?;

        let history_max_rounds = vars.positive("VAPORWATCH_HISTORY_MAX_ROUNDS", DEFAULT_MAX_ROUNDS)?;
        let history_max_age = vars
            .optional_positive::<i64>("VAPORWATCH_HISTORY_MAX_AGE_SECS")?
            .map(ChronoDuration::seconds);

        let report_path = match lookup("VAPORWATCH_REPORT_PATH") {
            Some(p) if p.trim().is_empty() => None,
            Some(p) => Some(PathBuf::from(p.trim())),
            None => Some(PathBuf::from("README.md")),
        };

        let control = Self::control_config(&vars, targets.len())?;

        Ok(Self {
            strategy,
            default_port,
            timeout: Duration::from_millis(vars.positive("VAPORWATCH_TIMEOUT_MS", 5000u64)?),
            probe_delay: Duration::from_millis(vars.parsed("VAPORWATCH_PROBE_DELAY_MS", 300u64)?),
            round_interval: Duration::from_secs(vars.parsed("VAPORWATCH_ROUND_INTERVAL_SECS", 30u64)?),
            max_rounds: vars.positive("VAPORWATCH_MAX_ROUNDS", 1u32)?,
            failure_threshold: vars.positive("VAPORWATCH_FAILURE_THRESHOLD", 3u32)?,
            round_mode: vars.parsed("VAPORWATCH_ROUND_MODE", RoundMode::ProbeAll)?,
            stop_on_healthy: vars.flag("VAPORWATCH_STOP_ON_HEALTHY", false)?,
            status_policy: vars.parsed("VAPORWATCH_HTTP_STATUS", StatusPolicy::AnyResponse)?,
            proxy: vars.get("VAPORWATCH_PROXY"),
            proxy_check_url: vars
                .get("VAPORWATCH_PROXY_CHECK_URL")
                .unwrap_or_else(|| DEFAULT_PROXY_CHECK_URL.to_string()),
            history_path: PathBuf::from(
                vars.get("VAPORWATCH_HISTORY_PATH")
                    .unwrap_or_else(|| "ui_history.json".to_string()),
            ),
            retention: Retention {
                max_rounds: Some(history_max_rounds),
                max_age: history_max_age,
            },
            report_path,
            mask_addresses: vars.flag("VAPORWATCH_MASK_ADDRESSES", true)?,
            control,
            targets,
        })
    }

    fn control_config<F>(vars: &Vars<'_, F>, target_count: usize) -> Result<Option<ControlConfig>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = vars.get("VAPORWATCH_USERNAME");
        let password = vars.get("VAPORWATCH_PASSWORD");

        let credentials = match (username, password) {
            (None, None) => return Ok(None),
            (Some(_), None) => {
                return Err(ConfigError::MissingCredential("VAPORWATCH_USERNAME", "VAPORWATCH_PASSWORD"))
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingCredential("VAPORWATCH_PASSWORD", "VAPORWATCH_USERNAME"))
            }
            (Some(username), Some(password)) => Credentials { username, password },
        };

        let control_index = vars.parsed("VAPORWATCH_CONTROL_TARGET", 0usize)?;
        if control_index >= target_count {
            return Err(ConfigError::ControlTargetOutOfRange {
                index: control_index,
                count: target_count,
            });
        }

        Ok(Some(ControlConfig {
            credentials,
            control_index,
            login_path: vars
                .get("VAPORWATCH_LOGIN_PATH")
                .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string()),
            restart_path: vars
                .get("VAPORWATCH_RESTART_PATH")
                .unwrap_or_else(|| DEFAULT_RESTART_PATH.to_string()),
            timeout: Duration::from_millis(vars.positive("VAPORWATCH_CONTROL_TIMEOUT_MS", 10_000u64)?),
        }))
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            strategy: self.strategy,
            timeout: self.timeout,
            status_policy: self.status_policy,
            proxy: self.proxy.clone(),
            check_url: self.proxy_check_url.clone(),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            round: RoundSettings {
                mode: self.round_mode,
                probe_delay: self.probe_delay,
                mask_addresses: self.mask_addresses,
            },
            max_rounds: self.max_rounds,
            round_interval: self.round_interval,
            failure_threshold: self.failure_threshold,
            stop_on_healthy: self.stop_on_healthy,
            report_path: self.report_path.clone(),
        }
    }

    /// HTTP control plane and control target, when credentials are set.
    pub fn control_plane(&self) -> Option<(HttpControlPlane, Target, Credentials)> {
        let control = self.control.as_ref()?;
        let plane = HttpControlPlane {
            login_path: control.login_path.clone(),
            restart_path: control.restart_path.clone(),
            timeout: control.timeout,
            prefer_https: self.strategy == Strategy::Tls,
        };
        let target = self.targets.get(control.control_index)?.clone();
        Some((plane, target, control.credentials.clone()))
    }
}

/// Trimmed, non-empty variable access with typed parsing.
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name, value }),
            None => Ok(default),
        }
    }

    fn positive<T: FromStr + PartialOrd + Default>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        let value = self.parsed(name, default)?;
        if value <= T::default() {
            return Err(ConfigError::InvalidValue {
                name,
                value: self.get(name).unwrap_or_default(),
            });
        }
        Ok(value)
    }

    fn optional_positive<T: FromStr + PartialOrd + Default>(&self, name: &'static str) -> Result<Option<T>, ConfigError> {
        match self.get(name) {
            Some(_) => self.positive(name, T::default()).map(Some),
            None => Ok(None),
        }
    }

    fn flag(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(name).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue { name, value: v }),
            },
        }
    }
}
