//! Request-scoped execution context.
//!
//! A [`Context`] is created once per request and handed to every resolver
//! of that request. It carries the immutable request identity (id, auth
//! token, opaque configuration values) and type-keyed request-scoped
//! services such as data loaders, whose interior mutability forms the
//! request's scratch space. Clones are handles to the same request; a
//! context is never reused across requests.

use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Per-request execution context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    request_id: u64,
    auth_token: Option<String>,
    values: HashMap<String, Value>,
    services: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        ContextBuilder::default().build()
    }

    /// Starts building a context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Returns the process-unique id of this request.
    pub fn request_id(&self) -> u64 {
        self.inner.request_id
    }

    /// Returns the bearer token attached to this request.
    pub fn auth_token(&self) -> Option<&str> {
        self.inner.auth_token.as_deref()
    }

    /// Gets an opaque configuration value.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.inner.values.get(key)
    }

    /// Gets an opaque configuration value as a specific type.
    pub fn value_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.inner
            .values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a request-scoped service by type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.inner
            .services
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Returns true if a service of the given type is attached.
    pub fn contains<T: 'static>(&self) -> bool {
        self.inner.services.contains_key(&TypeId::of::<T>())
    }

    /// Cancels the request. In-flight work is abandoned at its next
    /// suspension point.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!(request_id = self.inner.request_id, "request cancelled");
            self.inner.cancel_notify.notify_waiters();
        }
    }

    /// Returns true once [`Context::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Completes when the request is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.cancel_notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.inner.request_id)
            .field("authenticated", &self.inner.auth_token.is_some())
            .field("values", &self.inner.values.len())
            .field("services", &self.inner.services.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Builder for [`Context`].
#[derive(Default)]
pub struct ContextBuilder {
    auth_token: Option<String>,
    values: HashMap<String, Value>,
    services: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ContextBuilder {
    /// Sets the bearer token.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets an opaque configuration value.
    pub fn value<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.values.insert(key.into(), v);
        }
        self
    }

    /// Attaches a request-scoped service. A service of the same type is
    /// replaced.
    pub fn insert<T: Send + Sync + 'static>(mut self, service: T) -> Self {
        self.services.insert(TypeId::of::<T>(), Box::new(service));
        self
    }

    /// Builds the context.
    pub fn build(self) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                request_id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
                auth_token: self.auth_token,
                values: self.values,
                services: self.services,
                cancelled: AtomicBool::new(false),
                cancel_notify: Notify::new(),
            }),
        }
    }
}
