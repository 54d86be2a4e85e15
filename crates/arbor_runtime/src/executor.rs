//! Query execution.
//!
//! The executor walks a validated document against the [`TypeRegistry`],
//! invoking resolvers and completing their values into a [`ResultNode`]
//! tree.
//!
//! Sibling fields are resolved concurrently within the request's task
//! (mutation root fields run one after another); a field's sub-fields are
//! resolved only after its own value is known.
//!
//! Null propagation: a failure in a non-null position is recorded once, at
//! the failing field's path, and then bubbles up as [`Propagate`] until a
//! nullable position absorbs it by becoming null. If nothing absorbs it the
//! whole `data` is null.

use crate::coercion::{coerce_argument_values, coerce_variables};
use crate::context::Context;
use crate::error::{FieldError, PathSegment, ResolverError};
use crate::query::{Directive, FieldSelection, OperationKind, QueryDocument, Selection, Variables};
use crate::resolver::{Resolver, ResolverArgs, ResolverInfo, ResolverResult};
use crate::response::{Response, ResultNode};
use crate::schema::{ObjectDef, TypeDef, TypeRef, TypeRegistry};
use crate::validation::validate;
use futures::future::{join_all, BoxFuture};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::Instrument;

/// Executor configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum selection depth; deeper documents fail validation.
    pub max_depth: Option<usize>,
    /// Timeout for a single resolver call in milliseconds.
    pub field_timeout_ms: Option<u64>,
    /// Emit a trace span per resolved field.
    pub tracing: bool,
}

impl ExecutorConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Sets the per-resolver timeout.
    pub fn with_field_timeout(mut self, timeout: Duration) -> Self {
        self.field_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Enables per-field tracing spans.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    /// Returns the per-resolver timeout.
    pub fn field_timeout(&self) -> Option<Duration> {
        self.field_timeout_ms.map(Duration::from_millis)
    }
}

/// The query executor.
pub struct Executor {
    config: ExecutorConfig,
    registry: Arc<TypeRegistry>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Creates a new executor.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(registry, ExecutorConfig::default())
    }

    /// Creates an executor with configuration.
    pub fn with_config(registry: Arc<TypeRegistry>, config: ExecutorConfig) -> Self {
        Self { config, registry }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Validates the document and coerces its variables.
    ///
    /// Validation reports every problem; variable coercion stops at the
    /// first one.
    pub fn prepare(
        &self,
        document: &QueryDocument,
        variables: &Variables,
    ) -> Result<Variables, Vec<FieldError>> {
        validate(&self.registry, document, self.config.max_depth)?;
        coerce_variables(&self.registry, &document.variables, variables).map_err(|e| vec![e])
    }

    /// Executes a document against an empty root value.
    pub async fn execute(
        &self,
        document: &QueryDocument,
        variables: &Variables,
        ctx: &Context,
    ) -> Response {
        self.execute_with_root(document, variables, ctx, Value::Object(serde_json::Map::new()))
            .await
    }

    /// Executes a document against the given root value.
    pub async fn execute_with_root(
        &self,
        document: &QueryDocument,
        variables: &Variables,
        ctx: &Context,
        root_value: Value,
    ) -> Response {
        let variables = match self.prepare(document, variables) {
            Ok(variables) => variables,
            Err(errors) => {
                tracing::debug!(
                    request_id = ctx.request_id(),
                    errors = errors.len(),
                    "document rejected before execution"
                );
                return Response::from_errors(errors);
            }
        };

        let root_type = match self.registry.root_type(document.kind) {
            Ok(root) => root,
            Err(e) => return Response::error(FieldError::internal(e.to_string())),
        };

        tracing::debug!(
            request_id = ctx.request_id(),
            operation = %document.kind,
            name = document.name.as_deref().unwrap_or(""),
            "executing operation"
        );

        let execution = Execution {
            registry: &self.registry,
            config: &self.config,
            document,
            variables: &variables,
            ctx,
            errors: Mutex::new(Vec::new()),
        };

        let data = tokio::select! {
            biased;
            () = ctx.cancelled() => {
                return Response::error(FieldError::internal("Request was cancelled"));
            }
            data = execution.execute_root(root_type, root_value) => data,
        };

        Response::new(data, execution.into_errors())
    }
}

/// Marker for a failure in a non-null position that has already been
/// recorded and must null the nearest nullable ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Propagate;

type Completion = Result<ResultNode, Propagate>;

/// Fields of one selection set grouped by response key.
type GroupedFields<'a> = IndexMap<&'a str, Vec<&'a FieldSelection>>;

struct Execution<'a> {
    registry: &'a TypeRegistry,
    config: &'a ExecutorConfig,
    document: &'a QueryDocument,
    variables: &'a Variables,
    ctx: &'a Context,
    errors: Mutex<Vec<FieldError>>,
}

impl<'a> Execution<'a> {
    fn record(&self, error: FieldError) {
        tracing::debug!(
            request_id = self.ctx.request_id(),
            kind = %error.kind,
            path = ?error.path,
            message = %error.message,
            "field error"
        );
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    fn into_errors(self) -> Vec<FieldError> {
        self.errors.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `error` and nulls the field if `ty` allows it.
    fn fail(&self, ty: &TypeRef, error: FieldError) -> Completion {
        self.record(error);
        if ty.is_nullable() {
            Ok(ResultNode::Null)
        } else {
            Err(Propagate)
        }
    }

    async fn execute_root(&self, root: &'a ObjectDef, root_value: Value) -> ResultNode {
        let fields = self.collect_fields(root, &self.document.selection_set);
        let serial = self.document.kind == OperationKind::Mutation;
        self.execute_fields(root, &root_value, fields, &[], serial)
            .await
            .unwrap_or(ResultNode::Null)
    }

    async fn execute_fields(
        &self,
        object: &'a ObjectDef,
        parent: &Value,
        fields: GroupedFields<'a>,
        path: &[PathSegment],
        serial: bool,
    ) -> Completion {
        let mut results = Vec::with_capacity(fields.len());

        if serial {
            for (key, group) in fields {
                let field_path = child_path(path, key);
                results.push((key, self.execute_field(object, parent, group, field_path).await));
            }
        } else {
            let pending = fields.into_iter().map(|(key, group)| {
                let field_path = child_path(path, key);
                async move { (key, self.execute_field(object, parent, group, field_path).await) }
            });
            results = join_all(pending).await;
        }

        let mut completed = IndexMap::with_capacity(results.len());
        let mut propagate = false;
        for (key, result) in results {
            match result {
                Ok(node) => {
                    completed.insert(key.to_string(), node);
                }
                Err(Propagate) => propagate = true,
            }
        }

        if propagate {
            Err(Propagate)
        } else {
            Ok(ResultNode::Object(completed))
        }
    }

    async fn execute_field(
        &self,
        object: &'a ObjectDef,
        parent: &Value,
        group: Vec<&'a FieldSelection>,
        path: Vec<PathSegment>,
    ) -> Completion {
        let Some(field) = group.first().copied() else {
            return Ok(ResultNode::Null);
        };

        if field.name == "__typename" {
            return Ok(ResultNode::Scalar(Value::String(object.name.clone())));
        }

        let Some(field_def) = object.fields.get(&field.name) else {
            return Err(self.propagate(
                FieldError::internal(format!(
                    "Field '{}' is not defined on type '{}'",
                    field.name, object.name
                ))
                .with_path(path),
            ));
        };
        let ty = &field_def.ty;

        let args = match coerce_argument_values(
            self.registry,
            field_def,
            &field.arguments,
            self.variables,
        ) {
            Ok(args) => args,
            Err(e) => return self.fail(ty, e.into_field_error(path)),
        };

        let resolver = self.registry.resolver(&object.name, &field.name);

        let info = ResolverInfo::new(&field.name, &object.name)
            .with_return_type(ty.clone())
            .with_path(path.clone());

        let value = match self.invoke(resolver, parent, &args, &info).await {
            Ok(value) => value,
            Err(e) => return self.fail(ty, e.into_field_error(path)),
        };

        let label = format!("{}.{}", object.name, field.name);
        self.complete_value(ty, &group, value, path, &label).await
    }

    async fn invoke(
        &self,
        resolver: &dyn Resolver,
        parent: &Value,
        args: &ResolverArgs,
        info: &ResolverInfo,
    ) -> ResolverResult {
        let call = async {
            match self.config.field_timeout() {
                Some(limit) => {
                    let resolving = resolver.resolve(parent, args, self.ctx, info);
                    tokio::time::timeout(limit, resolving).await.unwrap_or_else(|_| {
                        Err(ResolverError::upstream(format!(
                            "{}.{} timed out after {}ms",
                            info.parent_type,
                            info.field_name,
                            limit.as_millis()
                        )))
                    })
                }
                None => resolver.resolve(parent, args, self.ctx, info).await,
            }
        };

        if self.config.tracing {
            let span = tracing::trace_span!(
                "resolve",
                field = %format!("{}.{}", info.parent_type, info.field_name),
                path = ?info.path,
            );
            call.instrument(span).await
        } else {
            call.await
        }
    }

    fn propagate(&self, error: FieldError) -> Propagate {
        self.record(error);
        Propagate
    }

    /// Completes a resolved value against its declared type.
    fn complete_value<'b>(
        &'b self,
        ty: &'a TypeRef,
        fields: &'b [&'a FieldSelection],
        value: Value,
        path: Vec<PathSegment>,
        label: &'b str,
    ) -> BoxFuture<'b, Completion> {
        Box::pin(async move {
            match ty {
                TypeRef::Option(inner) => {
                    if value.is_null() {
                        return Ok(ResultNode::Null);
                    }
                    Ok(self
                        .complete_value(inner, fields, value, path, label)
                        .await
                        .unwrap_or(ResultNode::Null))
                }
                _ if value.is_null() => Err(self.propagate(
                    FieldError::internal(format!(
                        "Cannot return null for non-nullable field {label}."
                    ))
                    .with_path(path),
                )),
                TypeRef::List(inner) => {
                    let Value::Array(items) = value else {
                        return Err(self.propagate(
                            FieldError::internal(format!(
                                "Expected a list for field {label}."
                            ))
                            .with_path(path),
                        ));
                    };
                    let pending = items.into_iter().enumerate().map(|(index, item)| {
                        let mut item_path = path.clone();
                        item_path.push(PathSegment::Index(index));
                        self.complete_value(inner, fields, item, item_path, label)
                    });
                    join_all(pending)
                        .await
                        .into_iter()
                        .collect::<Result<Vec<_>, _>>()
                        .map(ResultNode::List)
                }
                TypeRef::Named(name) => self.complete_named(name, fields, value, path).await,
            }
        })
    }

    async fn complete_named(
        &self,
        type_name: &'a str,
        fields: &[&'a FieldSelection],
        value: Value,
        path: Vec<PathSegment>,
    ) -> Completion {
        let object = match self.registry.describe(type_name) {
            Ok(TypeDef::Scalar(_) | TypeDef::Enum(_)) => {
                return match self.registry.serialize_leaf(type_name, &value) {
                    Ok(wire) => Ok(ResultNode::Scalar(wire)),
                    Err(e) => Err(self.propagate(FieldError::internal(e.to_string()).with_path(path))),
                };
            }
            Ok(TypeDef::Object(object)) => object,
            Ok(TypeDef::Interface(_) | TypeDef::Union(_)) => {
                match self.registry.resolve_variant(type_name, &value) {
                    Ok(object) => object,
                    Err(e) => {
                        return Err(self.propagate(FieldError::internal(e.to_string()).with_path(path)))
                    }
                }
            }
            Ok(TypeDef::InputObject(_)) => {
                return Err(self.propagate(
                    FieldError::internal(format!("Input type '{type_name}' used as output"))
                        .with_path(path),
                ))
            }
            Err(e) => return Err(self.propagate(FieldError::internal(e.to_string()).with_path(path))),
        };

        let sub_fields = self.collect_fields(
            object,
            fields.iter().flat_map(|&field| field.selection_set.iter()),
        );
        self.execute_fields(object, &value, sub_fields, &path, false)
            .await
    }

    /// Groups the selections that apply to `object` by response key,
    /// honouring `@skip`/`@include` and fragment type conditions.
    fn collect_fields(
        &self,
        object: &ObjectDef,
        selections: impl IntoIterator<Item = &'a Selection>,
    ) -> GroupedFields<'a> {
        let mut grouped = GroupedFields::default();
        let mut visited = FxHashSet::default();
        self.collect_into(object, selections, &mut grouped, &mut visited);
        grouped
    }

    fn collect_into(
        &self,
        object: &ObjectDef,
        selections: impl IntoIterator<Item = &'a Selection>,
        grouped: &mut GroupedFields<'a>,
        visited: &mut FxHashSet<&'a str>,
    ) {
        for selection in selections {
            if !self.should_include(selection.directives()) {
                continue;
            }
            match selection {
                Selection::Field(field) => {
                    grouped.entry(field.response_key()).or_default().push(field);
                }
                Selection::InlineFragment(fragment) => {
                    let applies = fragment
                        .type_condition
                        .as_deref()
                        .map_or(true, |condition| {
                            self.registry.is_possible_type(condition, &object.name)
                        });
                    if applies {
                        self.collect_into(object, &fragment.selection_set, grouped, visited);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !visited.insert(spread.name.as_str()) {
                        continue;
                    }
                    let Some(fragment) = self.document.fragments.get(&spread.name) else {
                        continue;
                    };
                    if self
                        .registry
                        .is_possible_type(&fragment.type_condition, &object.name)
                    {
                        self.collect_into(object, &fragment.selection_set, grouped, visited);
                    }
                }
            }
        }
    }

    fn should_include(&self, directives: &[Directive]) -> bool {
        let condition = |directive: &Directive| {
            directive
                .argument("if")
                .and_then(|value| value.resolve(self.variables))
                .and_then(|value| value.as_bool())
        };

        directives.iter().all(|directive| match directive.name.as_str() {
            "skip" => condition(directive) != Some(true),
            "include" => condition(directive) != Some(false),
            _ => true,
        })
    }
}

fn child_path(path: &[PathSegment], key: &str) -> Vec<PathSegment> {
    let mut child = Vec::with_capacity(path.len() + 1);
    child.extend_from_slice(path);
    child.push(PathSegment::Field(key.to_string()));
    child
}
