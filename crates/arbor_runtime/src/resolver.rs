//! Resolver system.
//!
//! A resolver computes one field's value from its parent value, its coerced
//! arguments and the request context. Fields without a bound resolver read
//! their value off the parent object.

use crate::context::Context;
use crate::error::{PathSegment, ResolverError};
use crate::schema::TypeRef;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Coerced arguments of one field, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverArgs {
    args: IndexMap<String, Value>,
}

impl ResolverArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type. `None` when absent or of the
    /// wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument.
    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        let value = self
            .args
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ResolverError::ArgumentParseError(name.to_string(), e.to_string()))
    }

    /// Sets an argument.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }
}

/// The field being resolved.
#[derive(Debug, Clone)]
pub struct ResolverInfo {
    /// Field name.
    pub field_name: String,
    /// Declared return type.
    pub return_type: TypeRef,
    /// Object type owning the field.
    pub parent_type: String,
    /// Response path of this occurrence.
    pub path: Vec<PathSegment>,
}

impl ResolverInfo {
    pub fn new(field_name: impl Into<String>, parent_type: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            return_type: TypeRef::nullable("String"),
            parent_type: parent_type.into(),
            path: Vec::new(),
        }
    }

    pub fn with_return_type(mut self, ty: TypeRef) -> Self {
        self.return_type = ty;
        self
    }

    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<Value, ResolverError>;

/// Future returned by [`Resolver::resolve`].
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverResult> + Send + 'a>>;

/// Computes the value of a field.
pub trait Resolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a>;
}

type SyncFn =
    dyn Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult + Send + Sync;

/// Adapts a synchronous function into a [`Resolver`].
pub struct FnResolver {
    func: Arc<SyncFn>,
}

impl FnResolver {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl Resolver for FnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let result = (self.func)(parent, args, ctx, info);
        Box::pin(async move { result })
    }
}

type AsyncFn = dyn Fn(Value, ResolverArgs, Context, ResolverInfo) -> ResolverFuture<'static>
    + Send
    + Sync;

/// Adapts an async function into a [`Resolver`]. The function receives
/// owned copies so its future can outlive the borrow of the executor.
pub struct AsyncFnResolver {
    func: Arc<AsyncFn>,
}

impl AsyncFnResolver {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        Self {
            func: Arc::new(move |parent, args, ctx, info| Box::pin(f(parent, args, ctx, info))),
        }
    }
}

impl Resolver for AsyncFnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        (self.func)(parent.clone(), args.clone(), ctx.clone(), info.clone())
    }
}

/// Reads the field, or its snake_case spelling, off a JSON object parent.
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let field_name = &info.field_name;
        let result = match parent {
            Value::Object(map) => Ok(map
                .get(field_name)
                .or_else(|| map.get(&to_snake_case(field_name)))
                .cloned()
                .unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            _ => Err(ResolverError::FieldNotFound(field_name.clone())),
        };
        Box::pin(async move { result })
    }
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Resolver bindings of a registry, keyed by type then field.
#[derive(Default)]
pub(crate) struct FieldResolvers {
    by_type: FxHashMap<String, FxHashMap<String, Box<dyn Resolver>>>,
}

impl FieldResolvers {
    pub(crate) fn bind(&mut self, type_name: String, field_name: String, resolver: Box<dyn Resolver>) {
        self.by_type
            .entry(type_name)
            .or_default()
            .insert(field_name, resolver);
    }

    /// The bound resolver, or [`DefaultResolver`].
    pub(crate) fn get(&self, type_name: &str, field_name: &str) -> &dyn Resolver {
        match self
            .by_type
            .get(type_name)
            .and_then(|fields| fields.get(field_name))
        {
            Some(resolver) => resolver.as_ref(),
            None => &DefaultResolver,
        }
    }

    fn len(&self) -> usize {
        self.by_type.values().map(FxHashMap::len).sum()
    }
}

impl fmt::Debug for FieldResolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldResolvers")
            .field("bound", &self.len())
            .finish()
    }
}
