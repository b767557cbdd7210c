use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::{
    AuthorizationSettings, BootstrapConfig, DEFAULT_AUTHORIZATION_TIMEOUT,
    DEFAULT_STORE_KEY, DEFAULT_VALIDATION_TIMEOUT,
    sources::{EnvConfig, FileConfig},
};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["gatehouse.toml", "config/gatehouse.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Use this instead of reading the process environment (and skip `.env`).
    pub env: Option<EnvConfig>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: BootstrapConfig,
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env_config, env_file_loaded) = match &self.options.env {
            Some(env) => (env.clone(), false),
            None => {
                let loaded = self.load_env_file()?;
                (EnvConfig::gather(), loaded)
            }
        };

        let (file_config, config_path) = self.load_file_config(&env_config)?;
        let config = compose_config(file_config.unwrap_or_default(), env_config)?;

        info!(
            "Session bootstrap configured for {} (store key '{}')",
            config.backend_url, config.store_key
        );

        Ok(ConfigLoad {
            config,
            config_path,
            env_file_loaded,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let result = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match result {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env_config.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => {
                    debug!("No gatehouse.toml found; using environment only");
                    return Ok((None, None));
                }
            },
        };

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

fn compose_config(file: FileConfig, env: EnvConfig) -> Result<BootstrapConfig, ConfigLoadError> {
    let FileConfig {
        backend_url: file_backend_url,
        store_key: file_store_key,
        authorization_timeout: file_authorization_timeout,
        validation_timeout: file_validation_timeout,
        authorization: file_authorization,
    } = file;

    let raw_backend_url = env
        .backend_url
        .or(file_backend_url)
        .ok_or(ConfigLoadError::MissingBackendUrl)?;
    let backend_url = Url::parse(raw_backend_url.trim()).map_err(|source| {
        ConfigLoadError::InvalidBackendUrl {
            value: raw_backend_url.clone(),
            source,
        }
    })?;

    let store_key = env
        .store_key
        .or(file_store_key)
        .unwrap_or_else(|| DEFAULT_STORE_KEY.to_string());
    if store_key.trim().is_empty() {
        return Err(ConfigLoadError::EmptyStoreKey);
    }

    let authorization_timeout = resolve_timeout(
        "authorization_timeout",
        env.authorization_timeout.or(file_authorization_timeout),
        DEFAULT_AUTHORIZATION_TIMEOUT,
    )?;
    let validation_timeout = resolve_timeout(
        "validation_timeout",
        env.validation_timeout.or(file_validation_timeout),
        DEFAULT_VALIDATION_TIMEOUT,
    )?;

    let defaults = AuthorizationSettings::default();
    let authorization = AuthorizationSettings {
        domain: env.auth_domain.or(file_authorization.domain),
        client_id: env.auth_client_id.or(file_authorization.client_id),
        redirect_uri: env.redirect_uri.or(file_authorization.redirect_uri),
        scopes: env
            .scopes
            .or(file_authorization.scopes)
            .unwrap_or(defaults.scopes),
        response_type: file_authorization
            .response_type
            .unwrap_or(defaults.response_type),
        nonce: file_authorization.nonce,
    };

    Ok(BootstrapConfig {
        backend_url,
        store_key,
        authorization_timeout,
        validation_timeout,
        authorization,
    })
}

fn resolve_timeout(
    field: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = humantime::parse_duration(raw.trim()).map_err(|source| {
        ConfigLoadError::InvalidDuration {
            field,
            value: raw.clone(),
            source,
        }
    })?;
    if value.is_zero() {
        return Err(ConfigLoadError::ZeroTimeout { field });
    }
    Ok(value)
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("backend URL not configured (set GATEHOUSE_BACKEND_URL or backend_url)")]
    MissingBackendUrl,
    #[error("invalid backend URL '{value}'")]
    InvalidBackendUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("store key must not be empty")]
    EmptyStoreKey,
    #[error("invalid duration '{value}' for {field}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
