//! Integration tests for arbor_sdk

use arbor_runtime::{
    field, Context, ErrorKind, FieldDef, InputValueDef, ObjectDef, PathSegment, QueryDocument,
    ResolverError, ResolverResult, TypeRef, TypeRegistry, Variables,
};
use arbor_sdk::{
    ErrorCode, ErrorPolicy, PubSubHub, Server, ServerConfig, SubscriptionSource, MASKED_MESSAGE,
};
use serde_json::json;
use std::time::Duration;

const COMMENT_ADDED: &str = "COMMENT_ADDED";

fn registry() -> TypeRegistry {
    TypeRegistry::builder()
        .query_type("Query")
        .subscription_type("Subscription")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("hello", TypeRef::named("String")))
                .field(FieldDef::new("me", TypeRef::nullable("User")))
                .field(
                    FieldDef::new("userInputError", TypeRef::nullable("String"))
                        .argument(InputValueDef::new("input", TypeRef::nullable("String"))),
                )
                .field(FieldDef::new("boom", TypeRef::nullable("String")))
                .field(FieldDef::new("hang", TypeRef::nullable("String"))),
        )
        .add_type(ObjectDef::new("User").field(FieldDef::new("name", TypeRef::named("String"))))
        .add_type(
            ObjectDef::new("Comment")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("content", TypeRef::named("String")))
                .field(FieldDef::new("repoName", TypeRef::named("String"))),
        )
        .add_type(
            ObjectDef::new("Subscription").field(
                FieldDef::new("commentAdded", TypeRef::named("Comment"))
                    .argument(InputValueDef::new("repoFullName", TypeRef::named("String"))),
            ),
        )
        .resolver_fn("Query", "hello", |_, _, _, _| Ok(json!("world")))
        .resolver_fn("Query", "me", |_, _, ctx, _| match ctx.auth_token() {
            Some("foo") => Ok(json!({"name": "Ada"})),
            token => Err(ResolverError::Unauthenticated(format!(
                "token {token:?} rejected"
            ))),
        })
        .resolver_fn("Query", "userInputError", |_, args, _, _| {
            match args.get_as::<String>("input").as_deref() {
                Some("expected") => Ok(json!("ok")),
                _ => Err(ResolverError::user_input("input", "Form Arguments invalid")),
            }
        })
        .resolver_fn("Query", "boom", |_, _, _, _| {
            Err(ResolverError::Internal("connection pool exhausted".into()))
        })
        .resolver_async("Query", "hang", |_, _, _, _| {
            std::future::pending::<ResolverResult>()
        })
        .build()
        .unwrap()
}

fn server_with_hub(hub: PubSubHub, policy: ErrorPolicy) -> Server {
    let source_hub = hub.clone();
    Server::builder()
        .registry(registry())
        .pubsub(hub)
        .error_policy(policy)
        .subscription("commentAdded", move |args, ctx| {
            if ctx.auth_token().is_none() {
                return Err(ResolverError::Unauthenticated("subscriptions need a token".into()));
            }
            let repo: String = args.require("repoFullName")?;
            Ok(source_hub
                .subscribe(COMMENT_ADDED, move |event| Ok(event["repoName"] == repo.as_str()))
                .into())
        })
        .build()
        .unwrap()
}

fn comment_subscription(repo: &str) -> QueryDocument {
    QueryDocument::subscription().select([field("commentAdded")
        .arg("repoFullName", repo)
        .select([field("id"), field("content")])])
}

#[tokio::test]
async fn test_error_policy_masks_sensitive_errors() {
    let server = server_with_hub(PubSubHub::new(), ErrorPolicy::default());
    let ctx = Context::builder().auth_token("bar").build();
    let doc = QueryDocument::query().select([
        field("me").select([field("name")]),
        field("userInputError").arg("input", "unexpected"),
        field("boom"),
    ]);

    let response = server.execute(&doc, &Variables::new(), &ctx).await;
    assert_eq!(
        response.data.clone().into_json(),
        json!({"me": null, "userInputError": null, "boom": null})
    );

    let by_kind = |kind: ErrorKind| {
        response
            .errors
            .iter()
            .find(|e| e.kind == kind)
            .unwrap_or_else(|| panic!("no {kind} in {:?}", response.errors))
    };

    let auth = by_kind(ErrorKind::AuthenticationError);
    assert_eq!(auth.message, MASKED_MESSAGE);
    assert_eq!(auth.path, Some(vec![PathSegment::from("me")]));

    let input = by_kind(ErrorKind::UserInputError);
    assert_eq!(input.message, "Form Arguments invalid");
    assert_eq!(input.extension("argumentName"), Some(&json!("input")));

    let internal = by_kind(ErrorKind::InternalError);
    assert_eq!(internal.message, MASKED_MESSAGE);
    assert!(!internal.message.contains("pool"));
}

#[tokio::test]
async fn test_context_prefilled_from_config() {
    let config = ServerConfig::new()
        .token("foo")
        .service("movies", "https://movies-api-dev.example.com/");
    let server = Server::builder()
        .registry(registry())
        .config(config)
        .build()
        .unwrap();

    let ctx = server.context().build();
    assert_eq!(ctx.auth_token(), Some("foo"));
    assert_eq!(
        ctx.value("services.movies"),
        Some(&json!("https://movies-api-dev.example.com/"))
    );
    assert_eq!(ctx.value("env"), Some(&json!("development")));
    assert!(ctx.get::<PubSubHub>().is_some());

    let doc = QueryDocument::query().select([field("me").select([field("name")])]);
    let body = server.execute_json(&doc, &Variables::new(), &ctx).await;
    assert_eq!(body, json!({"data": {"me": {"name": "Ada"}}}));
}

#[tokio::test]
async fn test_spawned_request_completes() {
    let server = server_with_hub(PubSubHub::new(), ErrorPolicy::default());
    let doc = QueryDocument::query().select([field("hello")]);

    let handle = server.spawn(doc, Variables::new(), Context::new());
    let response = handle.wait().await;
    assert_eq!(response.into_json(), json!({"data": {"hello": "world"}}));
}

#[tokio::test]
async fn test_cancel_spawned_request() {
    let server = server_with_hub(PubSubHub::new(), ErrorPolicy::passthrough());
    let doc = QueryDocument::query().select([field("hello"), field("hang")]);

    let handle = server.spawn(doc, Variables::new(), Context::new());
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.cancel();

    let response = tokio::time::timeout(Duration::from_secs(1), handle.wait())
        .await
        .expect("cancelled request should finish");
    assert!(response.data.is_null());
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].kind, ErrorKind::InternalError);
    assert_eq!(response.errors[0].message, "Request was cancelled");
}

#[tokio::test]
async fn test_dropping_handle_cancels_request() {
    let server = server_with_hub(PubSubHub::new(), ErrorPolicy::default());
    let doc = QueryDocument::query().select([field("hang")]);
    let ctx = Context::new();

    let handle = server.spawn(doc, Variables::new(), ctx.clone());
    drop(handle);
    assert!(ctx.is_cancelled());
}

#[tokio::test]
async fn test_abandoned_wait_cancels_request() {
    let server = server_with_hub(PubSubHub::new(), ErrorPolicy::default());
    let doc = QueryDocument::query().select([field("hang")]);
    let ctx = Context::new();

    let handle = server.spawn(doc, Variables::new(), ctx.clone());
    let waited = tokio::time::timeout(Duration::from_millis(20), handle.wait()).await;
    assert!(waited.is_err());
    assert!(ctx.is_cancelled());
}

#[tokio::test]
async fn test_subscription_delivers_filtered_events() {
    let hub = PubSubHub::new();
    let server = server_with_hub(hub.clone(), ErrorPolicy::default());
    let ctx = Context::builder().auth_token("foo").build();

    let mut stream = server
        .subscribe(&comment_subscription("arbor/arbor"), &Variables::new(), &ctx)
        .unwrap();
    assert_eq!(hub.subscriber_count(COMMENT_ADDED), 1);

    let accepted = hub.publish(
        COMMENT_ADDED,
        json!({"id": "1", "content": "first", "repoName": "arbor/arbor"}),
    );
    assert_eq!(accepted, 1);
    let skipped = hub.publish(
        COMMENT_ADDED,
        json!({"id": "2", "content": "elsewhere", "repoName": "other/repo"}),
    );
    assert_eq!(skipped, 0);
    hub.publish(
        COMMENT_ADDED,
        json!({"id": "3", "content": "second", "repoName": "arbor/arbor"}),
    );

    let first = stream.next().await.unwrap();
    assert_eq!(
        first.into_json(),
        json!({"data": {"commentAdded": {"id": "1", "content": "first"}}})
    );
    let second = stream.next().await.unwrap();
    assert_eq!(
        second.into_json(),
        json!({"data": {"commentAdded": {"id": "3", "content": "second"}}})
    );

    drop(stream);
    assert_eq!(hub.subscriber_count(COMMENT_ADDED), 0);
    assert_eq!(hub.publish(COMMENT_ADDED, json!({"repoName": "arbor/arbor"})), 0);
}

#[tokio::test]
async fn test_cancelled_subscription_ends() {
    let hub = PubSubHub::new();
    let server = server_with_hub(hub.clone(), ErrorPolicy::default());
    let ctx = Context::builder().auth_token("foo").build();

    let mut stream = server
        .subscribe(&comment_subscription("arbor/arbor"), &Variables::new(), &ctx)
        .unwrap();
    ctx.cancel();

    let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("stream should end");
    assert!(next.is_none());
}

#[tokio::test]
async fn test_server_shutdown_ends_subscriptions() {
    let hub = PubSubHub::new();
    let server = server_with_hub(hub.clone(), ErrorPolicy::default());
    let ctx = Context::builder().auth_token("foo").build();

    let mut stream = server
        .subscribe(&comment_subscription("arbor/arbor"), &Variables::new(), &ctx)
        .unwrap();
    server.shutdown();

    assert!(hub.is_shut_down());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_subscription_setup_errors() {
    let server = server_with_hub(PubSubHub::new(), ErrorPolicy::default());

    let err = server
        .subscribe(&comment_subscription("arbor/arbor"), &Variables::new(), &Context::new())
        .unwrap_err();
    assert!(err.data.is_null());
    assert_eq!(err.errors[0].kind, ErrorKind::AuthenticationError);
    assert_eq!(err.errors[0].message, MASKED_MESSAGE);
    assert_eq!(err.errors[0].path, Some(vec![PathSegment::from("commentAdded")]));

    let query = QueryDocument::query().select([field("hello")]);
    let err = server
        .subscribe(&query, &Variables::new(), &Context::new())
        .unwrap_err();
    assert_eq!(err.errors[0].kind, ErrorKind::ValidationError);

    let unknown = QueryDocument::subscription().select([field("nope")]);
    let err = server
        .subscribe(&unknown, &Variables::new(), &Context::new())
        .unwrap_err();
    assert_eq!(err.errors[0].kind, ErrorKind::ValidationError);
}

#[test]
fn test_source_for_unknown_subscription_field() {
    let err = Server::builder()
        .registry(registry())
        .subscription("commentRemoved", |_, _| {
            Ok(SubscriptionSource::from_stream(futures::stream::empty()))
        })
        .build()
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SubscriptionError);
    assert!(err.message.contains("Subscription.commentRemoved"));
}
