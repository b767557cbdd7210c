use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_key: Option<String>,
    /// Humantime string, e.g. `"5m"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_timeout: Option<String>,
    /// Humantime string, e.g. `"30s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_timeout: Option<String>,
    #[serde(default)]
    pub authorization: FileAuthorizationConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthorizationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Values picked up from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub store_key: Option<String>,
    pub authorization_timeout: Option<String>,
    pub validation_timeout: Option<String>,
    pub auth_domain: Option<String>,
    pub auth_client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scopes: Option<Vec<String>>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut env_config = Self::default();

        env_config.config_path = var("GATEHOUSE_CONFIG").map(PathBuf::from);
        env_config.backend_url = var("GATEHOUSE_BACKEND_URL").or_else(|| var("BACKEND_URL"));
        env_config.store_key = var("GATEHOUSE_STORE_KEY");
        env_config.authorization_timeout = var("GATEHOUSE_AUTHORIZATION_TIMEOUT");
        env_config.validation_timeout = var("GATEHOUSE_VALIDATION_TIMEOUT");
        env_config.auth_domain = var("AUTH0_DOMAIN");
        env_config.auth_client_id = var("AUTH0_CLIENT_ID");
        env_config.redirect_uri = var("GATEHOUSE_REDIRECT_URI");
        env_config.scopes = var("GATEHOUSE_SCOPES").map(|raw| parse_scopes(&raw));

        env_config
    }
}

/// Scopes may be separated by commas or whitespace.
fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}
