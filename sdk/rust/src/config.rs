//! Server configuration.
//!
//! Values come from code, JSON, or `ARBOR_*` environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `ARBOR_ENV` | `env` (`development` / `production`) |
//! | `ARBOR_<SERVICE>_URL` | `services["<service>"]` |
//! | `ARBOR_TOKEN` | `token` |
//! | `ARBOR_CACHE_URL` | `cache_url` |
//! | `ARBOR_MAX_DEPTH` | `executor.max_depth` |
//! | `ARBOR_FIELD_TIMEOUT_MS` | `executor.field_timeout_ms` |

use crate::error::{ErrorCode, ResultExt, SdkError, SdkResult};
use crate::pubsub::PubSubConfig;
use arbor_runtime::ExecutorConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PREFIX: &str = "ARBOR_";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Returns the environment name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(SdkError::config(format!("unknown environment '{other}'"))),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Deployment environment.
    pub env: Environment,
    /// Executor settings.
    pub executor: ExecutorConfig,
    /// Pubsub settings.
    pub pubsub: PubSubConfig,
    /// Backend base URLs keyed by service name.
    pub services: IndexMap<String, String>,
    /// Credential attached to request contexts.
    pub token: Option<String>,
    /// Cache connection string.
    pub cache_url: Option<String>,
}

impl ServerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from `ARBOR_*` environment variables.
    pub fn from_env() -> SdkResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Reads the configuration from `ARBOR_*` key/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> SdkResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(PREFIX) else {
                continue;
            };
            let value = value.into();
            match name {
                "ENV" => config.env = value.parse()?,
                "TOKEN" => config.token = Some(value),
                "CACHE_URL" => config.cache_url = Some(value),
                "MAX_DEPTH" => {
                    let depth = value.parse().map_sdk_err_with(
                        ErrorCode::ConfigError,
                        format!("invalid ARBOR_MAX_DEPTH '{value}'"),
                    )?;
                    config.executor.max_depth = Some(depth);
                }
                "FIELD_TIMEOUT_MS" => {
                    let timeout = value.parse().map_sdk_err_with(
                        ErrorCode::ConfigError,
                        format!("invalid ARBOR_FIELD_TIMEOUT_MS '{value}'"),
                    )?;
                    config.executor.field_timeout_ms = Some(timeout);
                }
                other => {
                    if let Some(service) = other.strip_suffix("_URL").filter(|s| !s.is_empty()) {
                        config.services.insert(service.to_ascii_lowercase(), value);
                    }
                }
            }
        }

        Ok(config)
    }

    /// Parses the configuration from JSON.
    pub fn from_json(json: &str) -> SdkResult<Self> {
        serde_json::from_str(json).map_sdk_err(ErrorCode::ConfigError)
    }

    /// Sets the environment.
    pub fn env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Sets the executor configuration.
    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    /// Sets the pubsub configuration.
    pub fn pubsub(mut self, pubsub: PubSubConfig) -> Self {
        self.pubsub = pubsub;
        self
    }

    /// Adds a backend base URL.
    pub fn service(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.services.insert(name.into(), url.into());
        self
    }

    /// Sets the credential.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the cache connection string.
    pub fn cache_url(mut self, url: impl Into<String>) -> Self {
        self.cache_url = Some(url.into());
        self
    }

    /// Returns the base URL of a service.
    pub fn service_url(&self, name: &str) -> Option<&str> {
        self.services.get(name).map(String::as_str)
    }
}
