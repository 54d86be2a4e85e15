//! Server facade.
//!
//! [`Server`] bundles an [`Executor`], a [`PubSubHub`] and an
//! [`ErrorPolicy`] behind the calls a transport layer makes:
//!
//! - [`Server::execute`] for request/response operations
//! - [`Server::spawn`] to run an operation as its own task that can be
//!   cancelled when the client goes away
//! - [`Server::subscribe`] for long-lived subscription streams
//!
//! Every response leaving the server has passed through the error policy.

use crate::config::ServerConfig;
use crate::error::{ErrorCode, ErrorPolicy, SdkError, SdkResult, MASKED_MESSAGE};
use crate::pubsub::{PubSubHub, Subscription};
use arbor_runtime::coercion::coerce_argument_values;
use arbor_runtime::{
    Context, ContextBuilder, Executor, FieldError, OperationKind, PathSegment, QueryDocument,
    ResolverArgs, ResolverError, Response, TypeRegistry, Variables,
};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::task::JoinHandle;

/// The event source behind one subscription field.
pub struct SubscriptionSource(BoxStream<'static, Value>);

impl SubscriptionSource {
    /// Wraps an arbitrary event stream.
    pub fn from_stream(stream: impl Stream<Item = Value> + Send + 'static) -> Self {
        Self(stream.boxed())
    }
}

impl From<Subscription> for SubscriptionSource {
    fn from(subscription: Subscription) -> Self {
        Self::from_stream(subscription.into_stream())
    }
}

impl std::fmt::Debug for SubscriptionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSource").finish_non_exhaustive()
    }
}

/// Opens the event source of a subscription field from its coerced
/// arguments.
pub type SubscriptionSourceFn = Arc<
    dyn Fn(&ResolverArgs, &Context) -> Result<SubscriptionSource, ResolverError> + Send + Sync,
>;

/// A configured server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    executor: Executor,
    hub: PubSubHub,
    policy: ErrorPolicy,
    config: ServerConfig,
    subscriptions: HashMap<String, SubscriptionSourceFn>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.inner.config)
            .field("hub", &self.inner.hub)
            .field("subscriptions", &self.inner.subscriptions.len())
            .finish()
    }
}

impl Server {
    /// Creates a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Returns the type registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.inner.executor.registry()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns the process-wide pubsub hub.
    pub fn pubsub(&self) -> &PubSubHub {
        &self.inner.hub
    }

    /// Starts a request context prefilled from the configuration.
    ///
    /// The context carries the configured token, `env`, one
    /// `services.<name>` value per backend, and the pubsub hub as a service.
    pub fn context(&self) -> ContextBuilder {
        let config = &self.inner.config;
        let mut builder = Context::builder()
            .value("env", config.env.as_str())
            .insert(self.inner.hub.clone());

        if let Some(token) = &config.token {
            builder = builder.auth_token(token.clone());
        }
        for (name, url) in &config.services {
            builder = builder.value(format!("services.{name}"), url);
        }
        if let Some(cache_url) = &config.cache_url {
            builder = builder.value("cacheUrl", cache_url);
        }
        builder
    }

    /// Executes a query or mutation.
    pub async fn execute(
        &self,
        document: &QueryDocument,
        variables: &Variables,
        ctx: &Context,
    ) -> Response {
        if document.kind == OperationKind::Subscription {
            return self.reject(FieldError::validation(
                "Subscription operations must be started with subscribe",
            ));
        }

        let response = self.inner.executor.execute(document, variables, ctx).await;
        self.inner.policy.apply(response)
    }

    /// Executes and converts the response to its wire shape.
    pub async fn execute_json(
        &self,
        document: &QueryDocument,
        variables: &Variables,
        ctx: &Context,
    ) -> Value {
        self.execute(document, variables, ctx).await.into_json()
    }

    /// Runs an operation on its own task.
    ///
    /// Dropping the returned handle before [`ExecutionHandle::wait`]
    /// cancels the request.
    pub fn spawn(
        &self,
        document: QueryDocument,
        variables: Variables,
        ctx: Context,
    ) -> ExecutionHandle {
        let server = self.clone();
        let task_ctx = ctx.clone();
        let task =
            tokio::spawn(async move { server.execute(&document, &variables, &task_ctx).await });

        ExecutionHandle {
            ctx,
            task: Some(task),
        }
    }

    /// Starts a subscription.
    ///
    /// The operation must select exactly one subscription root field with a
    /// registered source. Each source event is executed as the root value
    /// of that field and yields one response. Setup failures are returned
    /// as a response carrying the errors.
    pub fn subscribe(
        &self,
        document: &QueryDocument,
        variables: &Variables,
        ctx: &Context,
    ) -> Result<ResponseStream, Response> {
        if document.kind != OperationKind::Subscription {
            return Err(self.reject(FieldError::validation(format!(
                "Expected a subscription operation, got {}",
                document.kind
            ))));
        }

        let executor = &self.inner.executor;
        let coerced = executor
            .prepare(document, variables)
            .map_err(|errors| self.inner.policy.apply(Response::from_errors(errors)))?;

        let Some(selection) = document.root_field() else {
            return Err(self.reject(FieldError::validation(
                "Subscription operations must select a root field",
            )));
        };
        let path = vec![PathSegment::from(selection.response_key())];

        let field = executor
            .registry()
            .root_type(OperationKind::Subscription)
            .ok()
            .and_then(|root| root.fields.get(&selection.name));
        let (Some(field), Some(source_fn)) = (field, self.inner.subscriptions.get(&selection.name))
        else {
            return Err(self.reject(
                FieldError::internal(format!(
                    "No subscription source for field '{}'",
                    selection.name
                ))
                .with_path(path),
            ));
        };

        let args = coerce_argument_values(executor.registry(), field, &selection.arguments, &coerced)
            .map_err(|e| self.reject(e.into_field_error(path.clone())))?;
        let source = source_fn(&args, ctx).map_err(|e| self.reject(e.into_field_error(path)))?;

        tracing::debug!(
            request_id = ctx.request_id(),
            field = %selection.name,
            "subscription started"
        );

        let server = self.clone();
        let document = Arc::new(document.clone());
        let variables = Arc::new(variables.clone());
        let field_name = selection.name.clone();
        let event_ctx = ctx.clone();
        let cancel_ctx = ctx.clone();

        let responses = source
            .0
            .then(move |event| {
                let server = server.clone();
                let document = Arc::clone(&document);
                let variables = Arc::clone(&variables);
                let ctx = event_ctx.clone();
                let mut root = serde_json::Map::new();
                root.insert(field_name.clone(), event);

                async move {
                    let response = server
                        .inner
                        .executor
                        .execute_with_root(&document, &variables, &ctx, Value::Object(root))
                        .await;
                    server.inner.policy.apply(response)
                }
            })
            .take_until(async move { cancel_ctx.cancelled().await });

        Ok(ResponseStream {
            inner: responses.boxed(),
        })
    }

    /// Closes every live subscription.
    pub fn shutdown(&self) {
        self.inner.hub.shutdown();
        tracing::info!("server shut down");
    }

    fn reject(&self, error: FieldError) -> Response {
        self.inner.policy.apply(Response::error(error))
    }
}

/// Builder for [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    registry: Option<Arc<TypeRegistry>>,
    config: ServerConfig,
    hub: Option<PubSubHub>,
    policy: Option<ErrorPolicy>,
    subscriptions: HashMap<String, SubscriptionSourceFn>,
}

impl ServerBuilder {
    /// Sets the type registry.
    pub fn registry(mut self, registry: impl Into<Arc<TypeRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing pubsub hub instead of creating one from the config.
    pub fn pubsub(mut self, hub: PubSubHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Sets the error policy.
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Registers the event source of a subscription root field.
    pub fn subscription<F>(mut self, field: impl Into<String>, source: F) -> Self
    where
        F: Fn(&ResolverArgs, &Context) -> Result<SubscriptionSource, ResolverError>
            + Send
            + Sync
            + 'static,
    {
        self.subscriptions.insert(field.into(), Arc::new(source));
        self
    }

    /// Builds the server.
    pub fn build(self) -> SdkResult<Server> {
        let registry = self
            .registry
            .ok_or_else(|| SdkError::new(ErrorCode::NoSchema, "No type registry provided"))?;

        if !self.subscriptions.is_empty() {
            let root = registry
                .root_type(OperationKind::Subscription)
                .map_err(|e| SdkError::new(ErrorCode::SubscriptionError, e.to_string()))?;
            if let Some(field) = self
                .subscriptions
                .keys()
                .find(|field| !root.fields.contains_key(*field))
            {
                return Err(SdkError::new(
                    ErrorCode::SubscriptionError,
                    format!("Subscription source for unknown field '{}.{field}'", root.name),
                ));
            }
        }

        let hub = self
            .hub
            .unwrap_or_else(|| PubSubHub::with_config(self.config.pubsub.clone()));
        let executor = Executor::with_config(registry, self.config.executor.clone());

        tracing::info!(
            env = %self.config.env,
            subscriptions = self.subscriptions.len(),
            "server ready"
        );

        Ok(Server {
            inner: Arc::new(ServerInner {
                executor,
                hub,
                policy: self.policy.unwrap_or_default(),
                config: self.config,
                subscriptions: self.subscriptions,
            }),
        })
    }
}

/// A running operation started by [`Server::spawn`].
pub struct ExecutionHandle {
    ctx: Context,
    task: Option<JoinHandle<Response>>,
}

impl ExecutionHandle {
    /// Returns the request context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Cancels the request. In-flight work is abandoned and the response
    /// reports the cancellation.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Waits for the response.
    pub async fn wait(mut self) -> Response {
        let Some(task) = self.task.take() else {
            return Response::error(FieldError::internal(MASKED_MESSAGE));
        };

        let mut guard = CancelOnDrop {
            ctx: &self.ctx,
            armed: true,
        };
        let joined = task.await;
        guard.armed = false;

        match joined {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    request_id = self.ctx.request_id(),
                    error = %e,
                    "execution task failed"
                );
                Response::error(FieldError::internal(MASKED_MESSAGE))
            }
        }
    }
}

/// Cancels the request if `wait` is dropped before the task finishes.
struct CancelOnDrop<'a> {
    ctx: &'a Context,
    armed: bool,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ctx.cancel();
        }
    }
}

impl Drop for ExecutionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.ctx.cancel();
        }
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("request_id", &self.ctx.request_id())
            .field("finished", &self.task.as_ref().map(JoinHandle::is_finished))
            .finish()
    }
}

/// Responses of one subscription.
pub struct ResponseStream {
    inner: BoxStream<'static, Response>,
}

impl ResponseStream {
    /// Waits for the next response. `None` once the source ends or the
    /// request is cancelled.
    pub async fn next(&mut self) -> Option<Response> {
        self.inner.next().await
    }
}

impl Stream for ResponseStream {
    type Item = Response;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Response>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream").finish_non_exhaustive()
    }
}
