//! arbor SDK
//!
//! Server-side building blocks on top of [`arbor_runtime`]:
//!
//! - [`pubsub`]: topic-keyed event hub feeding subscription streams
//! - [`error`]: error policy applied before responses leave the server
//! - [`datasource`]: REST backends with per-environment base URLs
//! - [`config`]: server configuration from code, JSON or the environment
//! - [`server`]: the facade a transport layer calls
//!
//! # Example
//!
//! ```
//! use arbor_runtime::{field, FieldDef, ObjectDef, QueryDocument, TypeRef, TypeRegistry, Variables};
//! use arbor_sdk::Server;
//! use serde_json::json;
//!
//! let registry = TypeRegistry::builder()
//!     .query_type("Query")
//!     .add_type(ObjectDef::new("Query").field(FieldDef::new("hello", TypeRef::named("String"))))
//!     .resolver_fn("Query", "hello", |_, _, _, _| Ok(json!("world")))
//!     .build()
//!     .unwrap();
//!
//! let server = Server::builder().registry(registry).build().unwrap();
//! let doc = QueryDocument::query().select([field("hello")]);
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()
//!     .unwrap();
//! let body = runtime.block_on(server.execute_json(&doc, &Variables::new(), &server.context().build()));
//! assert_eq!(body, json!({"data": {"hello": "world"}}));
//! ```

pub mod config;
pub mod datasource;
pub mod error;
pub mod pubsub;
pub mod server;

pub use config::{Environment, ServerConfig};
pub use datasource::{FetchError, FetchRequest, RestDataSource, Transport};
pub use error::{
    ErrorCode, ErrorPolicy, ErrorPolicyBuilder, ErrorReporter, ResultExt, SdkError, SdkResult,
    TracingReporter, MASKED_MESSAGE,
};
pub use pubsub::{
    FilterError, OverflowPolicy, PubSubConfig, PubSubHub, Subscription, TypedTopic,
};
pub use server::{
    ExecutionHandle, ResponseStream, Server, ServerBuilder, SubscriptionSource,
    SubscriptionSourceFn,
};
