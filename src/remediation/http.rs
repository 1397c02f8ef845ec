//! HTTP control plane.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AccessToken, AuthError, ControlPlane, RemediationError, RestartDispatch};
use crate::target::{Credentials, Target};

pub const DEFAULT_LOGIN_PATH: &str = "/api/login";
pub const DEFAULT_RESTART_PATH: &str = "/api/restart";

/// Control plane reached over HTTP(S) on the control target.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    pub login_path: String,
    pub restart_path: String,
    pub timeout: Duration,
    /// Use https for control targets configured without a scheme.
    pub prefer_https: bool,
}

impl Default for HttpControlPlane {
    fn default() -> Self {
        Self {
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            restart_path: DEFAULT_RESTART_PATH.to_string(),
            timeout: Duration::from_secs(10),
            prefer_https: false,
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    code: i64,
    #[serde(default)]
    data: Option<LoginData>,
}

#[derive(Deserialize)]
struct LoginData {
    #[serde(default, alias = "access_token", alias = "accessToken")]
    token: Option<String>,
}

/// Extract the access token from a login response body.
///
/// Success codes are `0` and `200`; the token lives at `data.token`.
pub fn parse_login_response(body: &str) -> Result<AccessToken, AuthError> {
    let response: LoginResponse =
        serde_json::from_str(body).map_err(|e| AuthError::Body(e.to_string()))?;

    if response.code != 0 && response.code != 200 {
        return Err(AuthError::Rejected(response.code));
    }

    response
        .data
        .and_then(|d| d.token)
        .filter(|t| !t.is_empty())
        .map(AccessToken::new)
        .ok_or(AuthError::MissingToken)
}

impl HttpControlPlane {
    /// Scheme, host and port of the control target.
    pub fn base_url(&self, control: &Target) -> String {
        let scheme = match control.scheme.as_deref() {
            Some(s @ ("http" | "https")) => s,
            _ if self.prefer_https || control.port == 443 => "https",
            _ => "http",
        };
        format!("{}://{}", scheme, control.authority())
    }

    fn endpoint(&self, control: &Target, path: &str) -> String {
        let base = self.base_url(control);
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
    }
}

impl ControlPlane for HttpControlPlane {
    async fn login(&self, control: &Target, credentials: &Credentials) -> Result<AccessToken, AuthError> {
        let client = self.client().map_err(|e| AuthError::Request(e.to_string()))?;
        let body = LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
        };

        let response = client
            .post(self.endpoint(control, &self.login_path))
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Body(e.without_url().to_string()))?;

        parse_login_response(&text)
    }

    async fn restart(&self, control: &Target, token: &AccessToken) -> Result<RestartDispatch, RemediationError> {
        let client = self
            .client()
            .map_err(|e| RemediationError::InvalidControlTarget(e.to_string()))?;

        let sent = client
            .post(self.endpoint(control, &self.restart_path))
            .bearer_auth(token.as_str())
            .send()
            .await;

        match sent {
            Ok(response) => Ok(RestartDispatch::Acknowledged(response.status().as_u16())),
            Err(e) if e.is_builder() => Err(RemediationError::InvalidControlTarget(e.without_url().to_string())),
            // Refused or unresolvable: the request never left
            Err(e) if e.is_connect() => Err(RemediationError::RestartNotSent(e.without_url().to_string())),
            Err(e) => Ok(RestartDispatch::ConnectionSevered(e.without_url().to_string())),
        }
    }
}
