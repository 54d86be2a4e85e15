//! Execution runtime for arbor.
//!
//! This crate provides the request-execution core:
//! - `schema`: Type registry, definitions and the schema builder
//! - `query`: Pre-parsed query documents
//! - `validation`: Document validation against the registry
//! - `coercion`: Variable and argument coercion
//! - `executor`: Query execution with null propagation
//! - `resolver`: Resolver trait and function adapters
//! - `dataloader`: Per-request batching and caching
//! - `context`: Request-scoped context and cancellation
//! - `scalar`: Built-in and custom scalar codecs
//! - `response`: Result tree and response envelope
//!
//! ```
//! use arbor_runtime::{field, Context, Executor, ObjectDef, FieldDef, QueryDocument, SchemaBuilder, TypeRef};
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let registry = SchemaBuilder::new()
//!     .add_type(ObjectDef::new("Query").field(FieldDef::new("hello", TypeRef::named("String"))))
//!     .resolver_fn("Query", "hello", |_, _, _, _| Ok("world".into()))
//!     .build()
//!     .unwrap();
//!
//! let executor = Executor::new(Arc::new(registry));
//! let document = QueryDocument::query().select([field("hello")]);
//! let response = executor.execute(&document, &Default::default(), &Context::new()).await;
//! assert_eq!(response.into_json(), serde_json::json!({"data": {"hello": "world"}}));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod coercion;
pub mod context;
pub mod dataloader;
pub mod error;
pub mod executor;
pub mod query;
pub mod resolver;
pub mod response;
pub mod scalar;
pub mod schema;
pub mod validation;

pub use context::{Context, ContextBuilder};
pub use dataloader::{create_loader, BatchFn, DataLoader};
pub use error::{
    ErrorKind, FieldError, PathSegment, ResolverError, ScalarCoercionError, SchemaError,
    TypeResolutionError,
};
pub use executor::{Executor, ExecutorConfig};
pub use query::{
    field, on, spread, var, Directive, FieldSelection, FragmentDefinition, FragmentSpread,
    InlineFragment, InputValue, OperationKind, QueryDocument, Selection, VariableDefinition,
    Variables,
};
pub use resolver::{
    AsyncFnResolver, DefaultResolver, FnResolver, Resolver, ResolverArgs, ResolverFuture,
    ResolverInfo, ResolverResult,
};
pub use response::{Response, ResultNode};
pub use scalar::{ScalarCodec, SharedScalarCodec};
pub use schema::{
    EnumDef, FieldDef, InputObjectDef, InputValueDef, InterfaceDef, ObjectDef, SchemaBuilder,
    TypeDef, TypeKind, TypeRef, TypeRegistry, UnionDef,
};
