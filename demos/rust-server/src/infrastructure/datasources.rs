//! REST backends for movies and personalization, plus an in-memory
//! transport standing in for the network.

use crate::domain::Progress;
use arbor_runtime::{Context, ResolverError};
use arbor_sdk::{FetchError, FetchRequest, RestDataSource, ServerConfig, Transport};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub const MOVIES_DEV_URL: &str = "https://movies-api-dev.example.com/";
pub const MOVIES_URL: &str = "https://movies-api.example.com/";
pub const PERSONALIZATION_URL: &str = "https://personalization-api.example.com/";

/// The movies backend. The base URL follows the environment unless a
/// `movies` service URL is configured.
#[derive(Debug, Clone)]
pub struct MoviesApi {
    source: RestDataSource,
}

impl MoviesApi {
    pub fn new(config: &ServerConfig, transport: Arc<dyn Transport>) -> Self {
        let source = match config.service_url("movies") {
            Some(url) => RestDataSource::new(url, transport),
            None => RestDataSource::for_environment(config.env, MOVIES_DEV_URL, MOVIES_URL, transport),
        };
        Self { source }
    }

    pub async fn get_movie(&self, id: &str, ctx: &Context) -> Result<Value, ResolverError> {
        let movie = self.source.fetch_one(&format!("movies/{id}"), &[], ctx).await?;
        Ok(tag_movie(movie))
    }

    pub async fn most_viewed(&self, limit: i32, ctx: &Context) -> Result<Vec<Value>, ResolverError> {
        let limit = limit.to_string();
        let data = self
            .source
            .fetch_one("movies", &[("per_page", &limit), ("order_by", "most_viewed")], ctx)
            .await?;

        match data {
            Value::Object(mut body) => match body.remove("results") {
                Some(Value::Array(results)) => Ok(results.into_iter().map(tag_movie).collect()),
                _ => Err(ResolverError::upstream("movies response has no results")),
            },
            _ => Err(ResolverError::upstream("movies response is not an object")),
        }
    }
}

fn tag_movie(mut movie: Value) -> Value {
    if let Some(fields) = movie.as_object_mut() {
        fields.insert("kind".to_string(), json!("Movie"));
    }
    movie
}

/// The personalization backend.
#[derive(Debug, Clone)]
pub struct PersonalizationApi {
    source: RestDataSource,
}

impl PersonalizationApi {
    pub fn new(config: &ServerConfig, transport: Arc<dyn Transport>) -> Self {
        let url = config
            .service_url("personalization")
            .unwrap_or(PERSONALIZATION_URL);
        Self {
            source: RestDataSource::new(url, transport),
        }
    }

    /// Fetches progress for many ids in one call, authenticated as the
    /// request behind `ctx`. The result is aligned with `ids`.
    pub async fn progress_for(
        &self,
        ids: &[String],
        ctx: &Context,
    ) -> Result<Vec<Option<Progress>>, ResolverError> {
        let joined = ids.join(",");
        let mut request = self.source.request("progress", &[("ids", &joined)]);
        self.source.will_send_request(&mut request, ctx);

        let body = self.source.fetch(request).await?;
        let progress: Vec<Progress> = serde_json::from_value(body)
            .map_err(|e| ResolverError::upstream(format!("invalid progress response: {e}")))?;

        Ok(ids
            .iter()
            .map(|id| progress.iter().find(|p| &p.id == id).cloned())
            .collect())
    }
}

/// Serves canned JSON keyed by URL path and records every request.
#[derive(Default)]
pub struct FixtureTransport {
    responses: Mutex<HashMap<String, Result<Value, u16>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed_data() -> Self {
        let transport = Self::new();
        let jurassic_park = json!({"id": "1", "title": "Jurassic Park", "releaseDate": 739_584_000});
        let sphere = json!({"id": "2", "title": "Sphere", "releaseDate": 913_766_400});

        transport.respond("movies/1", jurassic_park.clone());
        transport.respond("movies/2", sphere.clone());
        transport.respond("movies", json!({"results": [jurassic_park, sphere]}));
        transport.respond(
            "progress",
            json!([{"id": "1", "percent": 40}, {"id": "2", "percent": 100}]),
        );
        transport
    }

    pub fn respond(&self, path: impl Into<String>, body: Value) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), Ok(body));
    }

    pub fn fail(&self, path: impl Into<String>, status: u16) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), Err(status));
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn get(&self, request: FetchRequest) -> Result<Value, FetchError> {
        let path = request
            .url
            .split_once("://")
            .and_then(|(_, rest)| rest.split_once('/'))
            .map_or("", |(_, path)| path)
            .to_string();
        let url = request.url.clone();

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let response = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path)
            .cloned();

        match response {
            Some(Ok(body)) => Ok(body),
            Some(Err(status)) => Err(FetchError::Status { url, status }),
            None => Err(FetchError::Status { url, status: 404 }),
        }
    }
}
