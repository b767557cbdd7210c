//! Bootstrapper configuration
//!
//! Values come from an optional `gatehouse.toml`, a `.env` file and the
//! process environment, in increasing order of precedence. See
//! [`ConfigLoader`].

mod loader;
mod sources;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use sources::{EnvConfig, FileAuthorizationConfig, FileConfig};

/// Storage key used when none is configured.
pub const DEFAULT_STORE_KEY: &str = "userToken";

/// How long to wait for the consent flow to report back.
pub const DEFAULT_AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Upper bound for a single validator round trip.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const DEFAULT_SCOPES: [&str; 4] = ["openid", "profile", "email", "offline_access"];

pub(crate) const DEFAULT_RESPONSE_TYPE: &str = "id_token token";

/// Fully resolved bootstrapper configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    /// Base URL of the backend exposing `/validateToken`.
    pub backend_url: Url,
    /// Key under which the credential is persisted.
    pub store_key: String,
    pub authorization_timeout: Duration,
    pub validation_timeout: Duration,
    pub authorization: AuthorizationSettings,
}

impl BootstrapConfig {
    /// Configuration with defaults for everything except the backend.
    pub fn new(backend_url: Url) -> Self {
        Self {
            backend_url,
            store_key: DEFAULT_STORE_KEY.to_string(),
            authorization_timeout: DEFAULT_AUTHORIZATION_TIMEOUT,
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
            authorization: AuthorizationSettings::default(),
        }
    }

    pub fn with_store_key(mut self, key: impl Into<String>) -> Self {
        self.store_key = key.into();
        self
    }

    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout = timeout;
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    pub fn with_authorization(mut self, settings: AuthorizationSettings) -> Self {
        self.authorization = settings;
        self
    }
}

/// Parameters handed to the consent flow on every attempt.
///
/// Nothing here is interpreted by the bootstrapper itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSettings {
    /// Identity provider host, e.g. `tenant.eu.auth0.com`.
    pub domain: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    pub response_type: String,
    pub nonce: Option<String>,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            domain: None,
            client_id: None,
            redirect_uri: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            response_type: DEFAULT_RESPONSE_TYPE.to_string(),
            nonce: None,
        }
    }
}

impl AuthorizationSettings {
    /// Provider endpoints derived from `domain`.
    pub fn discovery(&self) -> Option<Discovery> {
        let domain = self.domain.as_deref()?.trim().trim_end_matches('/');
        if domain.is_empty() {
            return None;
        }
        let base = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        Some(Discovery {
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/oauth/token"),
            revocation_endpoint: format!("{base}/oauth/revoke"),
        })
    }

    /// Space-separated scope string as sent on the wire.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Identity provider endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub revocation_endpoint: String,
}
