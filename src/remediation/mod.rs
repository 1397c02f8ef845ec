//! Remediation: log in to the control target and ask it to restart.
//!
//! The restart request usually kills the connection it travels on, so a
//! connection-level failure while sending it is a successful dispatch and is
//! reported as `RestartDispatch::ConnectionSevered`, not as an error.

mod http;

pub use http::*;

use std::fmt;

use thiserror::Error;

use crate::target::{Credentials, Target};

/// Login failures. Any of these aborts the remediation attempt.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Request(String),
    #[error("login returned HTTP {0}")]
    Status(u16),
    #[error("malformed login response: {0}")]
    Body(String),
    #[error("login rejected with code {0}")]
    Rejected(i64),
    #[error("login response carried no access token")]
    MissingToken,
}

/// Remediation error types.
#[derive(Error, Debug)]
pub enum RemediationError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("invalid control target: {0}")]
    InvalidControlTarget(String),
    #[error("restart request could not be sent: {0}")]
    RestartNotSent(String),
}

/// How the restart request left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDispatch {
    /// The control target answered with this HTTP status.
    Acknowledged(u16),
    /// The connection dropped or timed out; expected while the target restarts.
    ConnectionSevered(String),
}

/// Opaque bearer token returned by login.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Control-plane operations used by remediation.
#[allow(async_fn_in_trait)]
pub trait ControlPlane {
    async fn login(&self, control: &Target, credentials: &Credentials) -> Result<AccessToken, AuthError>;

    async fn restart(&self, control: &Target, token: &AccessToken) -> Result<RestartDispatch, RemediationError>;
}

/// Log in and dispatch a restart. Not retried.
pub async fn remediate<C: ControlPlane>(
    plane: &C,
    control: &Target,
    credentials: &Credentials,
) -> Result<RestartDispatch, RemediationError> {
    tracing::warn!("Remediation: logging in to control target as {}", credentials.username);
    let token = plane.login(control, credentials).await?;

    tracing::info!("Remediation: login succeeded, dispatching restart");
    let dispatch = plane.restart(control, &token).await?;

    match &dispatch {
        RestartDispatch::Acknowledged(status) => {
            tracing::info!("Remediation: restart acknowledged with HTTP {}", status);
        }
        RestartDispatch::ConnectionSevered(reason) => {
            tracing::info!("Remediation: restart dispatched, connection closed by target ({})", reason);
        }
    }

    Ok(dispatch)
}
