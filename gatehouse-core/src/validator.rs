//! Token validator port and its HTTP implementation

use std::time::Duration;

use async_trait::async_trait;
use gatehouse_model::{Credential, SessionProfile, ValidationPayload};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info};
use url::Url;

use crate::error::ValidatorError;

/// Path of the validation endpoint, relative to the backend base URL.
pub const VALIDATE_TOKEN_PATH: &str = "validateToken";

/// Checks a credential with the backend and returns the hydrated profile.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, credential: &Credential) -> Result<SessionProfile, ValidatorError>;
}

/// `POST {backend}/validateToken` with the credential as a bearer token.
#[derive(Clone)]
pub struct HttpTokenValidator {
    client: Client,
    endpoint: String,
}

impl std::fmt::Debug for HttpTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenValidator")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpTokenValidator {
    /// Create a validator for `backend_url` with a per-request timeout.
    pub fn new(backend_url: &Url, timeout: Duration) -> Result<Self, ValidatorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidatorError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, backend_url))
    }

    /// Reuse an existing client (its own timeout settings apply).
    pub fn with_client(client: Client, backend_url: &Url) -> Self {
        let endpoint = build_endpoint(backend_url);
        info!("[TokenValidator] Validating credentials against {}", endpoint);
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn build_endpoint(backend_url: &Url) -> String {
    format!(
        "{}/{}",
        backend_url.as_str().trim_end_matches('/'),
        VALIDATE_TOKEN_PATH
    )
}

fn classify(err: reqwest::Error) -> ValidatorError {
    if err.is_timeout() {
        ValidatorError::Timeout
    } else {
        ValidatorError::Transport(err.to_string())
    }
}

#[async_trait]
impl TokenValidator for HttpTokenValidator {
    async fn validate(&self, credential: &Credential) -> Result<SessionProfile, ValidatorError> {
        debug!("[TokenValidator] Validating credential {}", credential);

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, credential.bearer())
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            // Body content is irrelevant for a rejection.
            return Err(ValidatorError::Rejected {
                status: status.as_u16(),
            });
        }

        let payload: ValidationPayload = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ValidatorError::Timeout
            } else {
                ValidatorError::Decode(e.to_string())
            }
        })?;

        Ok(payload.into())
    }
}
