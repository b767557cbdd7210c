//! Consent-flow port
//!
//! Opening the consent flow and learning its result are decoupled: `invoke`
//! only starts the flow, and the outcome arrives later as an
//! [`AuthorizationEvent`] published through a [`CompletionSender`]. The
//! bootstrapper owns the receiving end for its whole lifetime, so a flow may
//! report back at any time, including twice or after the bootstrapper moved
//! on. Each event names the attempt it belongs to, which is how stale reports
//! are told apart from the one being waited for.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_model::Credential;
use tokio::sync::mpsc;

use crate::config::AuthorizationSettings;
use crate::error::{BootstrapError, InitiatorError};

/// Identifies one invocation of the consent flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the consent flow reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Success(Credential),
    Cancelled,
    Failed(String),
}

impl AuthorizationOutcome {
    /// Interpret a redirect-style result (`type` plus query/fragment params).
    ///
    /// The credential is read from `id_token`, falling back to
    /// `access_token`.
    pub fn from_redirect(kind: &str, params: &HashMap<String, String>) -> Self {
        match kind {
            "success" => {
                let raw = params
                    .get("id_token")
                    .or_else(|| params.get("access_token"));
                match raw.map(|value| Credential::new(value.as_str())) {
                    Some(Ok(credential)) => Self::Success(credential),
                    Some(Err(e)) => Self::Failed(format!("unusable token: {e}")),
                    None => Self::Failed("success response carried no token".to_string()),
                }
            }
            "cancel" | "dismiss" | "locked" => Self::Cancelled,
            "error" => {
                let reason = params
                    .get("error_description")
                    .or_else(|| params.get("error"))
                    .cloned()
                    .unwrap_or_else(|| "unknown error".to_string());
                Self::Failed(reason)
            }
            other => Self::Failed(format!("unexpected response type '{other}'")),
        }
    }
}

/// Completion report for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationEvent {
    pub attempt: AttemptId,
    pub outcome: AuthorizationOutcome,
}

/// Publishing half of the bootstrapper's completion channel.
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: mpsc::UnboundedSender<AuthorizationEvent>,
}

impl CompletionSender {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<AuthorizationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report the outcome of `attempt`.
    ///
    /// Fails with [`BootstrapError::Closed`] once the bootstrapper is gone.
    pub fn publish(
        &self,
        attempt: AttemptId,
        outcome: AuthorizationOutcome,
    ) -> Result<(), BootstrapError> {
        self.tx
            .send(AuthorizationEvent { attempt, outcome })
            .map_err(|_| BootstrapError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Everything the consent flow needs to start one attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub attempt: AttemptId,
    pub settings: Arc<AuthorizationSettings>,
}

/// Opens the user-facing consent flow.
#[async_trait]
pub trait AuthorizationInitiator: Send + Sync {
    /// Start the flow for `request.attempt`; report the result through
    /// `completions`. Returning an error counts as a failed attempt.
    async fn invoke(
        &self,
        request: AuthorizationRequest,
        completions: CompletionSender,
    ) -> Result<(), InitiatorError>;
}
