//! Scripted collaborators for monitor tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::probe::{ProbeError, Prober};
use crate::remediation::{AccessToken, AuthError, ControlPlane, RemediationError, RestartDispatch};
use crate::target::{Credentials, Target};

/// Returns scripted latencies in call order; `None` is a timeout.
pub struct ScriptedProber {
    script: Mutex<VecDeque<Option<u64>>>,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new(script: Vec<Option<u64>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Prober for ScriptedProber {
    async fn measure(&self, _target: &Target) -> Result<Duration, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Some(ms)) => Ok(Duration::from_millis(ms)),
            Some(None) => Err(ProbeError::Timeout(Duration::from_secs(5))),
            None => Err(ProbeError::Network("script exhausted".to_string())),
        }
    }
}

enum LoginBehaviour {
    Succeed,
    Reject,
}

/// Records remediation calls.
pub struct RecordingControlPlane {
    login: LoginBehaviour,
    restart: RestartDispatch,
    logins: AtomicUsize,
    restarts: AtomicUsize,
    controls: Mutex<Vec<String>>,
}

impl RecordingControlPlane {
    fn build(login: LoginBehaviour, restart: RestartDispatch) -> Self {
        Self {
            login,
            restart,
            logins: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            controls: Mutex::new(Vec::new()),
        }
    }

    pub fn severing() -> Self {
        Self::build(
            LoginBehaviour::Succeed,
            RestartDispatch::ConnectionSevered("connection reset by peer".to_string()),
        )
    }

    pub fn failing_login() -> Self {
        Self::build(LoginBehaviour::Reject, RestartDispatch::Acknowledged(200))
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Labels of the control targets logged in to.
    pub fn controls(&self) -> Vec<String> {
        self.controls.lock().unwrap().clone()
    }
}

impl ControlPlane for RecordingControlPlane {
    async fn login(&self, control: &Target, _credentials: &Credentials) -> Result<AccessToken, AuthError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.controls.lock().unwrap().push(control.label.clone());
        match self.login {
            LoginBehaviour::Succeed => Ok(AccessToken::new("scripted-token")),
            LoginBehaviour::Reject => Err(AuthError::Rejected(401)),
        }
    }

    async fn restart(&self, _control: &Target, _token: &AccessToken) -> Result<RestartDispatch, RemediationError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(self.restart.clone())
    }
}
