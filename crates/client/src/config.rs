// crates/client/src/config.rs
//! Where the backend lives and how to talk to it.

use std::time::Duration;

use thiserror::Error;

use datadict_jobs::ConfigError;

pub const API_URL_ENV: &str = "DATADICT_API_URL";
pub const API_TOKEN_ENV: &str = "DATADICT_API_TOKEN";
pub const HTTP_TIMEOUT_ENV: &str = "DATADICT_HTTP_TIMEOUT_SECS";

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend root, without a trailing slash.
    pub base_url: String,
    /// Sent as a bearer token when set.
    pub api_token: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(API_URL_ENV).filter(|url| !url.trim().is_empty()) {
            Some(url) => Self::new(url.trim()),
            None => Self::default(),
        };
        config.api_token = lookup(API_TOKEN_ENV).filter(|token| !token.is_empty());
        if let Some(raw) = lookup(HTTP_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidDuration {
                        key: HTTP_TIMEOUT_ENV,
                        value: raw,
                    })
                }
            }
        }
        Ok(config)
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
