//! Runtime settings.
//!
//! Everything except signing secrets comes from a YAML file. Secrets are only
//! read from the environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;
use crate::token::{Secret, TokenPolicy};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:8888";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the access token secret.
pub const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET_SIGNATURE";
/// Environment variable holding the refresh token secret.
pub const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET_SIGNATURE";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid website url: {0}")]
    Url(#[from] url::ParseError),
    #[error("missing `{0}` environment variable")]
    MissingSecret(&'static str),
    #[error("invalid token lifetimes: {0}")]
    InvalidLifetime(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Website used to build verification links.
    pub url: String,
    /// Socket address to listen on.
    pub address: String,
    /// CORS whitelist. Empty allows any origin without credentials.
    pub allowed_origins: Vec<String>,
    #[serde(skip_deserializing)]
    pub version: String,
    #[serde(skip_serializing)]
    pub token: TokenLifetimes,
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2Params>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            url: "http://localhost:5173/".to_owned(),
            address: DEFAULT_ADDRESS.to_owned(),
            allowed_origins: Vec::new(),
            version: VERSION.to_owned(),
            token: TokenLifetimes::default(),
            argon2: None,
        }
    }
}

/// Argon2id cost parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2Params {
    /// KiB of memory per hash.
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
    /// Output length in bytes.
    pub hash_length: usize,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_cost: 64 * 1024,
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Token lifetimes, in seconds.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenLifetimes {
    pub access_lifetime: u64,
    pub refresh_lifetime: u64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_lifetime: 60 * 60,
            refresh_lifetime: 14 * 24 * 60 * 60,
        }
    }
}

impl TokenLifetimes {
    /// Both lifetimes must be positive and a refresh token must outlive an
    /// access token.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_lifetime == 0 {
            return Err(ConfigError::InvalidLifetime("`access_lifetime` must be positive"));
        }
        if self.refresh_lifetime == 0 {
            return Err(ConfigError::InvalidLifetime("`refresh_lifetime` must be positive"));
        }
        if self.refresh_lifetime < self.access_lifetime {
            return Err(ConfigError::InvalidLifetime(
                "`refresh_lifetime` is shorter than `access_lifetime`",
            ));
        }

        Ok(())
    }

    /// Pair each lifetime with its secret.
    pub fn policies(&self, access: Secret, refresh: Secret) -> (TokenPolicy, TokenPolicy) {
        let policy = |secret, seconds| TokenPolicy {
            secret,
            lifetime: Duration::from_secs(seconds),
        };

        (
            policy(access, self.access_lifetime),
            policy(refresh, self.refresh_lifetime),
        )
    }
}

/// Read access and refresh secrets from the environment.
pub fn secrets_from_env() -> Result<(Secret, Secret), ConfigError> {
    let read = |name: &'static str| {
        std::env::var(name)
            .ok()
            .filter(|value| !value.is_empty())
            .map(Secret::new)
            .ok_or(ConfigError::MissingSecret(name))
    };

    Ok((read(ACCESS_SECRET_ENV)?, read(REFRESH_SECRET_ENV)?))
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

/// Prefix a bare domain with `https://` and validate it.
fn normalize_url(url: &str) -> Result<String, url::ParseError> {
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        Url::parse(url)?
    } else {
        Url::parse(&format!("https://{url}"))?
    };

    Ok(url.into())
}

impl Configuration {
    /// Load settings from `path`, or `config.yaml` in the working directory.
    ///
    /// A missing or unparsable file is logged and replaced by defaults. An
    /// invalid website url or token lifetime is an error.
    pub fn load(path: Option<PathBuf>) -> Result<Arc<Self>, ConfigError> {
        let path = path
            .filter(|path| path.is_file())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = Self::parse(&path).unwrap_or_else(|err| {
            tracing::error!(
                path = %path.display(),
                error = %err,
                "cannot read configuration, using defaults"
            );
            Self::default()
        });
        config.version = VERSION.to_owned();
        config.url = normalize_url(&config.url)?;
        config.token.validate()?;

        Ok(Arc::new(config))
    }

    fn parse(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}
