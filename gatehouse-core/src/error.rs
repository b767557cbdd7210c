//! Error types for the session bootstrapper
//!
//! Every collaborator failure is absorbed into a session transition; the
//! [`BootstrapError`] values produced along the way are logged and attached to
//! transition records so callers can explain an `Unauthenticated` outcome.

use thiserror::Error;

/// Absorbed failure that caused a bootstrapper transition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// User declined or aborted the consent flow.
    #[error("Authorization cancelled")]
    AuthorizationCancelled,

    /// Consent flow reported an error (or never reported back in time).
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Validator explicitly rejected the credential.
    #[error("Credential rejected by validator (status {status})")]
    ValidationRejected { status: u16 },

    /// Could not talk to the validator or understand its answer.
    #[error("Validator transport error: {0}")]
    ValidationTransportError(String),

    /// The driver task is gone; no further transitions will happen.
    #[error("Session bootstrapper is shut down")]
    Closed,
}

impl From<ValidatorError> for BootstrapError {
    fn from(err: ValidatorError) -> Self {
        match err {
            ValidatorError::Rejected { status } => {
                BootstrapError::ValidationRejected { status }
            }
            other => BootstrapError::ValidationTransportError(other.to_string()),
        }
    }
}

/// Token store failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Failed to read key '{key}': {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Failed to write key '{key}': {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Failed to remove key '{key}': {reason}")]
    RemoveFailed { key: String, reason: String },
}

/// Failure to open the consent flow
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitiatorError {
    #[error("Consent flow unavailable: {0}")]
    Unavailable(String),
}

/// Token validator failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidatorError {
    /// Non-success HTTP status.
    #[error("Validator rejected credential with status {status}")]
    Rejected { status: u16 },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Validator timed out")]
    Timeout,
}

/// Result type alias for bootstrapper operations
pub type BootstrapResult<T> = Result<T, BootstrapError>;
