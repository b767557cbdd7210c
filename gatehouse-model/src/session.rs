//! Session value owned by the bootstrapper.
//!
//! The constructors are the only way to build a [`Session`], which keeps the
//! field/status pairing honest: a token exists outside `Unauthenticated`, and
//! profile data exists only while `Authenticated`.

use serde::{Deserialize, Serialize};

use crate::credential::Credential;

/// Coarse authentication status exposed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No usable credential; the caller should offer a login affordance.
    Unauthenticated,
    /// A credential is held and is being checked against the validator.
    Pending,
    /// The validator accepted the credential and profile data is attached.
    Authenticated,
    /// The validator rejected the credential. Transient: always followed by
    /// a purge and another transition.
    Invalid,
}

impl SessionStatus {
    /// Statuses a caller may observe once the bootstrapper stops moving.
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Authenticated)
    }
}

/// Data hydrated from a successful validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProfile {
    /// Opaque user payload returned by the backend.
    pub user: serde_json::Value,
    /// Opaque content payload (the accessible resources list).
    pub content: serde_json::Value,
    /// Subscriber flag.
    pub entitlement: bool,
}

/// Current authentication state of one client instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    status: SessionStatus,
    token: Option<Credential>,
    profile: Option<SessionProfile>,
}

impl Session {
    /// Fresh session with nothing attached.
    pub fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            token: None,
            profile: None,
        }
    }

    /// Session holding a credential that is awaiting validation.
    pub fn pending(token: Credential) -> Self {
        Self {
            status: SessionStatus::Pending,
            token: Some(token),
            profile: None,
        }
    }

    /// Session whose credential was accepted.
    pub fn authenticated(token: Credential, profile: SessionProfile) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            token: Some(token),
            profile: Some(profile),
        }
    }

    /// Session whose credential was just rejected.
    pub fn invalid(token: Credential) -> Self {
        Self {
            status: SessionStatus::Invalid,
            token: Some(token),
            profile: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn token(&self) -> Option<&Credential> {
        self.token.as_ref()
    }

    pub fn profile(&self) -> Option<&SessionProfile> {
        self.profile.as_ref()
    }

    /// User payload, present only while authenticated.
    pub fn user(&self) -> Option<&serde_json::Value> {
        self.profile.as_ref().map(|profile| &profile.user)
    }

    /// Content payload, present only while authenticated.
    pub fn content(&self) -> Option<&serde_json::Value> {
        self.profile.as_ref().map(|profile| &profile.content)
    }

    /// Subscriber flag, present only while authenticated.
    pub fn entitlement(&self) -> Option<bool> {
        self.profile.as_ref().map(|profile| profile.entitlement)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::unauthenticated()
    }
}
