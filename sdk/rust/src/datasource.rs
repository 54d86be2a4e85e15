//! REST data sources.
//!
//! A [`RestDataSource`] wraps one backend: it picks the base URL, attaches
//! the request's credential and maps transport failures onto
//! `UpstreamError`s. The HTTP client itself is supplied through the
//! [`Transport`] trait.

use crate::config::{Environment, ServerConfig};
use crate::error::{SdkError, SdkResult};
use arbor_runtime::{Context, ResolverError};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// An outgoing GET request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: IndexMap<String, String>,
}

impl FetchRequest {
    /// Creates a request for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Adds a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }
}

/// A transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("invalid response body from {url}: {message}")]
    Decode { url: String, message: String },
}

impl From<FetchError> for ResolverError {
    fn from(error: FetchError) -> Self {
        ResolverError::Upstream(error.to_string())
    }
}

/// Performs HTTP requests for data sources.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a GET request and decodes the JSON body.
    async fn get(&self, request: FetchRequest) -> Result<Value, FetchError>;
}

/// A REST backend.
#[derive(Clone)]
pub struct RestDataSource {
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for RestDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestDataSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestDataSource {
    /// Creates a data source for a fixed base URL.
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
        }
    }

    /// Picks the base URL by environment.
    pub fn for_environment(
        env: Environment,
        development_url: impl Into<String>,
        production_url: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let base_url = match env {
            Environment::Development => development_url.into(),
            Environment::Production => production_url.into(),
        };
        Self::new(base_url, transport)
    }

    /// Uses the base URL configured for `service`.
    pub fn from_config(
        config: &ServerConfig,
        service: &str,
        transport: Arc<dyn Transport>,
    ) -> SdkResult<Self> {
        let base_url = config
            .service_url(service)
            .ok_or_else(|| SdkError::config(format!("no base URL configured for '{service}'")))?;
        Ok(Self::new(base_url, transport))
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Decorates an outgoing request with the request's credential.
    pub fn will_send_request(&self, request: &mut FetchRequest, ctx: &Context) {
        if let Some(token) = ctx.auth_token() {
            request.set_header("Authorization", token);
        }
    }

    /// Fetches `path` relative to the base URL on behalf of a request.
    pub async fn fetch_one(
        &self,
        path: &str,
        query: &[(&str, &str)],
        ctx: &Context,
    ) -> Result<Value, ResolverError> {
        let mut request = self.request(path, query);
        self.will_send_request(&mut request, ctx);

        tracing::debug!(request_id = ctx.request_id(), url = %request.url, "fetching");
        self.fetch(request).await
    }

    /// Builds a request for `path` relative to the base URL.
    pub fn request(&self, path: &str, query: &[(&str, &str)]) -> FetchRequest {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        query
            .iter()
            .fold(FetchRequest::new(url), |request, (key, value)| {
                request.query(*key, *value)
            })
    }

    /// Sends a prepared request.
    pub async fn fetch(&self, request: FetchRequest) -> Result<Value, ResolverError> {
        self.transport.get(request).await.map_err(|e| {
            tracing::debug!(error = %e, "data source request failed");
            ResolverError::from(e)
        })
    }
}
