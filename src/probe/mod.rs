//! Probe module for reachability and latency measurement.
//!
//! Supports raw TCP connect, TCP+TLS handshake, HTTP GET and HTTP GET through
//! a proxy target.

mod http;
mod tcp;
mod tls;

pub use http::*;
pub use tcp::*;
pub use tls::*;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::target::Target;

/// Latency value recorded for failed probes.
pub const FAILURE_SENTINEL: i64 = -1;

/// Default URL fetched through proxy targets.
pub const DEFAULT_PROXY_CHECK_URL: &str = "https://ifconfig.me/ip";

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("tls handshake failed: {0}")]
    Tls(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// How a target is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Tcp,
    Tls,
    Http,
    /// The target is a proxy; a fixed URL is fetched through it.
    Proxy,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "tls" => Ok(Self::Tls),
            "http" | "https" => Ok(Self::Http),
            "proxy" | "socks5" => Ok(Self::Proxy),
            other => Err(format!("unknown probe strategy: {}", other)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tcp => "tcp",
            Self::Tls => "tls",
            Self::Http => "http",
            Self::Proxy => "proxy",
        };
        f.write_str(name)
    }
}

/// Which HTTP responses count as reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Any response received is a success.
    #[default]
    AnyResponse,
    /// Only 2xx and 3xx responses are a success.
    SuccessOnly,
}

impl StatusPolicy {
    pub fn accepts(&self, status: reqwest::StatusCode) -> bool {
        match self {
            Self::AnyResponse => true,
            Self::SuccessOnly => status.is_success() || status.is_redirection(),
        }
    }
}

impl FromStr for StatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::AnyResponse),
            "success" | "ok" => Ok(Self::SuccessOnly),
            other => Err(format!("unknown http status policy: {}", other)),
        }
    }
}

/// Outcome of one probe of one target.
///
/// Serialized as the latency in ms, `-1` for failures and `null` for targets
/// not probed in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latency {
    Measured(u64),
    Failed,
    NotProbed,
}

impl Latency {
    pub fn from_duration(d: Duration) -> Self {
        Self::Measured((d.as_secs_f64() * 1000.0).round() as u64)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Measured(_))
    }

    /// Latency in ms, or the failure sentinel when not a success.
    pub fn as_ms(&self) -> i64 {
        match self {
            Self::Measured(ms) => *ms as i64,
            _ => FAILURE_SENTINEL,
        }
    }
}

impl Serialize for Latency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Measured(ms) => serializer.serialize_u64(*ms),
            Self::Failed => serializer.serialize_i64(FAILURE_SENTINEL),
            Self::NotProbed => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Latency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<f64>::deserialize(deserializer)? {
            None => Self::NotProbed,
            Some(v) if v < 0.0 => Self::Failed,
            Some(v) => Self::Measured(v.round() as u64),
        })
    }
}

/// Result of probing one target once.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub target: Target,
    pub latency: Latency,
}

impl ProbeResult {
    pub fn from_measurement(target: Target, measurement: &Result<Duration, ProbeError>) -> Self {
        let latency = match measurement {
            Ok(d) => Latency::from_duration(*d),
            Err(_) => Latency::Failed,
        };
        Self { target, latency }
    }

    pub fn not_probed(target: Target) -> Self {
        Self {
            target,
            latency: Latency::NotProbed,
        }
    }

    pub fn ok(&self) -> bool {
        self.latency.is_ok()
    }
}

/// Probe configuration shared by every target in a run.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub strategy: Strategy,
    pub timeout: Duration,
    pub status_policy: StatusPolicy,
    /// Proxy for the `Http` strategy.
    pub proxy: Option<String>,
    /// URL fetched through targets by the `Proxy` strategy.
    pub check_url: String,
}

impl ProbeConfig {
    pub fn new(strategy: Strategy, timeout: Duration) -> Self {
        Self {
            strategy,
            timeout,
            status_policy: StatusPolicy::default(),
            proxy: None,
            check_url: DEFAULT_PROXY_CHECK_URL.to_string(),
        }
    }
}

/// Something that can measure a target.
///
/// Implementations resolve exactly once per call: a latency or an error.
#[allow(async_fn_in_trait)]
pub trait Prober {
    async fn measure(&self, target: &Target) -> Result<Duration, ProbeError>;
}

impl Prober for ProbeConfig {
    async fn measure(&self, target: &Target) -> Result<Duration, ProbeError> {
        run_probe(self, target).await
    }
}

/// Run a probe with the given configuration.
///
/// The whole attempt (resolution, connect, handshake, request) runs under one
/// timeout. On expiry the attempt future is dropped, which closes any socket
/// or in-flight request it owns.
pub async fn run_probe(config: &ProbeConfig, target: &Target) -> Result<Duration, ProbeError> {
    let attempt = async {
        match config.strategy {
            Strategy::Tcp => run_tcp_probe(target).await,
            Strategy::Tls => run_tls_probe(target).await,
            Strategy::Http => {
                run_http_probe(
                    &target.http_url(),
                    config.proxy.as_deref(),
                    config.timeout,
                    config.status_policy,
                )
                .await
            }
            Strategy::Proxy => {
                run_http_probe(
                    &config.check_url,
                    Some(&target.proxy_url()),
                    config.timeout,
                    config.status_policy,
                )
                .await
            }
        }
    };

    let latency = tokio::time::timeout(config.timeout, attempt)
        .await
        .map_err(|_| ProbeError::Timeout(config.timeout))??;

    if latency >= config.timeout {
        return Err(ProbeError::Timeout(config.timeout));
    }

    Ok(latency)
}
