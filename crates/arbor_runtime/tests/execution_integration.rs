//! Integration tests for query execution.

use arbor_runtime::scalar::DateScalar;
use arbor_runtime::{
    create_loader, field, on, spread, var, Context, DataLoader, ErrorKind, Executor, FieldDef,
    InputValueDef, InterfaceDef, ObjectDef, PathSegment, QueryDocument, ResolverError,
    SchemaBuilder, Selection, TypeRef, TypeRegistry, UnionDef, Variables,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

type BookLoader = DataLoader<i64, Value>;

fn authors() -> Vec<Value> {
    vec![
        json!({"id": 1, "name": "J.K. Rowling"}),
        json!({"id": 2, "name": "Michael Crichton"}),
    ]
}

fn books_of(author_id: i64) -> Option<Value> {
    match author_id {
        1 => Some(json!([{"id": "b1", "title": "Harry Potter", "kind": "Book"}])),
        2 => Some(json!([
            {"id": "b2", "title": "Jurassic Park", "kind": "Book"},
            {"id": "b3", "title": "Sphere", "kind": "Book"}
        ])),
        3 => Some(json!([{"id": "b4", "title": null, "kind": "Book"}])),
        _ => None,
    }
}

fn library() -> Arc<TypeRegistry> {
    let registry = SchemaBuilder::new()
        .scalar("Date", Arc::new(DateScalar))
        .mutation_type("Mutation")
        .add_type(
            InterfaceDef::new("Media")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("title", TypeRef::nullable("String"))),
        )
        .add_type(
            ObjectDef::new("Book")
                .implements("Media")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("title", TypeRef::named("String"))),
        )
        .add_type(
            ObjectDef::new("Movie")
                .implements("Media")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("title", TypeRef::named("String")))
                .field(FieldDef::new("releaseDate", TypeRef::nullable("Date"))),
        )
        .add_type(UnionDef::new("SearchResult").member("Book").member("Movie"))
        .add_type(
            ObjectDef::new("Author")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("name", TypeRef::named("String")))
                .field(FieldDef::new("books", TypeRef::list(TypeRef::named("Book")))),
        )
        .add_type(
            ObjectDef::new("Query")
                .field(
                    FieldDef::new("authors", TypeRef::list(TypeRef::named("Author")).optional())
                        .argument(
                            InputValueDef::new("includeGhost", TypeRef::nullable("Boolean"))
                                .default_value(false),
                        ),
                )
                .field(
                    FieldDef::new("search", TypeRef::list(TypeRef::nullable("SearchResult")))
                        .argument(InputValueDef::new("term", TypeRef::named("String"))),
                )
                .field(FieldDef::new("media", TypeRef::list(TypeRef::named("Media"))))
                .field(FieldDef::new("left", TypeRef::named("String")))
                .field(FieldDef::new("right", TypeRef::named("String"))),
        )
        .add_type(
            ObjectDef::new("Mutation").field(
                FieldDef::new("append", TypeRef::list(TypeRef::named("String")))
                    .argument(InputValueDef::new("value", TypeRef::named("String")))
                    .argument(
                        InputValueDef::new("delayMs", TypeRef::nullable("Int")).default_value(0),
                    ),
            ),
        )
        .discriminator("Media", |v| v.get("kind")?.as_str().map(String::from))
        .discriminator("SearchResult", |v| v.get("kind")?.as_str().map(String::from))
        .resolver_fn("Query", "authors", |_, args, _, _| {
            let mut all = authors();
            if args.get_as::<bool>("includeGhost") == Some(true) {
                all.push(json!({"id": 3, "name": "Ghost Writer"}));
            }
            Ok(Value::Array(all))
        })
        .resolver_async("Author", "books", |parent, _, ctx, _| async move {
            let loader = ctx
                .get::<BookLoader>()
                .ok_or_else(|| ResolverError::Internal("book loader missing".into()))?;
            let id = parent["id"].as_i64().unwrap_or_default();
            Ok(loader.load(id).await?.unwrap_or_else(|| json!([])))
        })
        .resolver_fn("Query", "search", |_, _, _, _| {
            Ok(json!([
                {"kind": "Movie", "id": "m1", "title": "Jurassic Park", "releaseDate": 739_584_000},
                {"kind": "Book", "id": "b2", "title": "Jurassic Park"},
                {"kind": "Podcast", "id": "p1", "title": "Dino Talk"}
            ]))
        })
        .resolver_fn("Query", "media", |_, _, _, _| {
            Ok(json!([
                {"kind": "Book", "id": "b1", "title": "Harry Potter"},
                {"kind": "Movie", "id": "m1", "title": "Jurassic Park"}
            ]))
        })
        .resolver_async("Query", "left", |_, _, ctx, _| async move {
            if let Some(barrier) = ctx.get::<Arc<Barrier>>() {
                barrier.wait().await;
            }
            Ok(json!("left"))
        })
        .resolver_async("Query", "right", |_, _, ctx, _| async move {
            if let Some(barrier) = ctx.get::<Arc<Barrier>>() {
                barrier.wait().await;
            }
            Ok(json!("right"))
        })
        .resolver_async("Mutation", "append", |_, args, ctx, _| async move {
            let value: String = args.require("value")?;
            let delay: u64 = args.get_as("delayMs").unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let log = ctx
                .get::<Mutex<Vec<String>>>()
                .ok_or_else(|| ResolverError::Internal("log missing".into()))?;
            let mut entries = log.lock().unwrap();
            entries.push(value);
            Ok(json!(entries.clone()))
        })
        .build()
        .unwrap();
    Arc::new(registry)
}

fn book_loader(calls: Arc<Mutex<Vec<Vec<i64>>>>) -> BookLoader {
    create_loader(move |keys: Vec<i64>| {
        let calls = Arc::clone(&calls);
        async move {
            calls.lock().unwrap().push(keys.clone());
            Ok(keys.into_iter().map(books_of).collect())
        }
    })
}

/// Sibling `books` fields across the list share one batch.
#[tokio::test]
async fn test_list_children_are_batched() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let ctx = Context::builder()
        .insert(book_loader(Arc::clone(&calls)))
        .build();

    let doc = QueryDocument::query()
        .select([field("authors").select([field("name"), field("books").select([field("title")])])]);
    let response = Executor::new(library())
        .execute(&doc, &Variables::new(), &ctx)
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json(),
        json!({"authors": [
            {"name": "J.K. Rowling", "books": [{"title": "Harry Potter"}]},
            {"name": "Michael Crichton", "books": [{"title": "Jurassic Park"}, {"title": "Sphere"}]}
        ]})
    );
    assert_eq!(*calls.lock().unwrap(), vec![vec![1, 2]]);
}

/// A null deep in non-null positions nulls the nearest nullable ancestor.
#[tokio::test]
async fn test_null_propagates_to_nearest_nullable() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let ctx = Context::builder()
        .insert(book_loader(Arc::clone(&calls)))
        .build();

    let doc = QueryDocument::query().select([field("authors")
        .arg("includeGhost", true)
        .select([field("name"), field("books").select([field("title")])])]);
    let response = Executor::new(library())
        .execute(&doc, &Variables::new(), &ctx)
        .await;

    assert_eq!(response.data.into_json(), json!({"authors": null}));
    assert_eq!(response.errors.len(), 1);

    let error = &response.errors[0];
    assert_eq!(error.kind, ErrorKind::InternalError);
    assert_eq!(
        error.path,
        Some(vec![
            PathSegment::from("authors"),
            PathSegment::from(2usize),
            PathSegment::from("books"),
            PathSegment::from(0usize),
            PathSegment::from("title"),
        ])
    );
}

#[tokio::test]
async fn test_abstract_types_resolve_concrete_selections() {
    let doc = QueryDocument::query()
        .select([
            field("search").arg("term", "jurassic").select([
                Selection::from(field("__typename")),
                Selection::from(on("Movie").select([field("title"), field("releaseDate")])),
                Selection::from(on("Book").select([field("title")])),
            ]),
            field("media").select([
                Selection::from(field("id")),
                Selection::from(spread("MediaTitle")),
            ]),
        ])
        .fragment("MediaTitle", "Media", [field("title")]);

    let response = Executor::new(library())
        .execute(&doc, &Variables::new(), &Context::new())
        .await;

    assert_eq!(
        response.data.into_json(),
        json!({
            "search": [
                {"__typename": "Movie", "title": "Jurassic Park", "releaseDate": 739_584_000},
                {"__typename": "Book", "title": "Jurassic Park"},
                null
            ],
            "media": [
                {"id": "b1", "title": "Harry Potter"},
                {"id": "m1", "title": "Jurassic Park"}
            ]
        })
    );

    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].kind, ErrorKind::InternalError);
    assert_eq!(
        response.errors[0].path,
        Some(vec![PathSegment::from("search"), PathSegment::from(2usize)])
    );
}

#[tokio::test]
async fn test_discriminator_runs_once_per_abstract_value() {
    let lookups = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&lookups);
    let registry = SchemaBuilder::new()
        .add_type(InterfaceDef::new("Media").field(FieldDef::new("id", TypeRef::named("ID"))))
        .add_type(
            ObjectDef::new("Book")
                .implements("Media")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("title", TypeRef::named("String"))),
        )
        .add_type(
            ObjectDef::new("Movie")
                .implements("Media")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("title", TypeRef::named("String"))),
        )
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("media", TypeRef::list(TypeRef::named("Media")))),
        )
        .discriminator("Media", move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            v.get("kind")?.as_str().map(String::from)
        })
        .resolver_fn("Query", "media", |_, _, _, _| {
            Ok(json!([
                {"kind": "Book", "id": "b1", "title": "Harry Potter"},
                {"kind": "Movie", "id": "m1", "title": "Jurassic Park"},
                {"kind": "Movie", "id": "m2", "title": "Sphere"}
            ]))
        })
        .build()
        .unwrap();

    let doc = QueryDocument::query()
        .select([field("media").select([
            Selection::from(field("__typename")),
            Selection::from(field("id")),
            Selection::from(on("Book").select([field("title")])),
            Selection::from(spread("MovieTitle")),
        ])])
        .fragment("MovieTitle", "Movie", [field("title")]);

    let response = Executor::new(Arc::new(registry))
        .execute(&doc, &Variables::new(), &Context::new())
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json(),
        json!({"media": [
            {"__typename": "Book", "id": "b1", "title": "Harry Potter"},
            {"__typename": "Movie", "id": "m1", "title": "Jurassic Park"},
            {"__typename": "Movie", "id": "m2", "title": "Sphere"}
        ]})
    );
    assert_eq!(lookups.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_include_directive_with_variable() {
    let doc = QueryDocument::query()
        .variable("withMedia", TypeRef::named("Boolean"))
        .select([
            field("media").include_if(var("withMedia")).select([field("id")]),
            field("search").arg("term", "x").select([on("Book").select([field("id")])]),
        ]);

    let mut variables = Variables::new();
    variables.insert("withMedia".into(), json!(false));

    let response = Executor::new(library())
        .execute(&doc, &variables, &Context::new())
        .await;
    let data = response.data.into_json();
    assert!(data.get("media").is_none());
    assert_eq!(data["search"][0], json!({}));
    assert_eq!(data["search"][1], json!({"id": "b2"}));
}

/// Invalid documents are rejected as a whole, before any resolver runs.
#[tokio::test]
async fn test_validation_errors_skip_execution() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invoked);
    let registry = SchemaBuilder::new()
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("ping", TypeRef::named("String")))
                .field(
                    FieldDef::new("movie", TypeRef::nullable("String"))
                        .argument(InputValueDef::new("id", TypeRef::named("ID"))),
                ),
        )
        .resolver_fn("Query", "ping", move |_, _, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!("pong"))
        })
        .build()
        .unwrap();

    let doc = QueryDocument::query().select([field("ping"), field("movie"), field("nope")]);
    let response = Executor::new(Arc::new(registry))
        .execute(&doc, &Variables::new(), &Context::new())
        .await;

    assert!(response.data.is_null());
    assert_eq!(response.errors.len(), 2);
    assert!(response
        .errors
        .iter()
        .all(|e| e.kind == ErrorKind::ValidationError && e.path.is_none()));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

/// Query siblings run concurrently; they would deadlock on the barrier
/// otherwise.
#[tokio::test]
async fn test_query_siblings_run_concurrently() {
    let ctx = Context::builder().insert(Arc::new(Barrier::new(2))).build();
    let doc = QueryDocument::query().select([field("left"), field("right")]);

    let executor = Executor::new(library());
    let response = tokio::time::timeout(
        Duration::from_secs(2),
        executor.execute(&doc, &Variables::new(), &ctx),
    )
    .await
    .expect("siblings should not wait on each other");

    assert_eq!(response.data.into_json(), json!({"left": "left", "right": "right"}));
}

/// Mutation root fields run one after another in document order.
#[tokio::test]
async fn test_mutation_fields_run_serially() {
    let ctx = Context::builder().insert(Mutex::new(Vec::<String>::new())).build();
    let doc = QueryDocument::mutation().select([
        field("append").alias("first").arg("value", "a").arg("delayMs", 30),
        field("append").alias("second").arg("value", "b"),
    ]);

    let response = Executor::new(library())
        .execute(&doc, &Variables::new(), &ctx)
        .await;

    assert_eq!(
        response.data.into_json(),
        json!({"first": ["a"], "second": ["a", "b"]})
    );
}

#[tokio::test]
async fn test_cancellation_abandons_pending_work() {
    // A barrier of three never opens with two waiters.
    let ctx = Context::builder().insert(Arc::new(Barrier::new(3))).build();
    let doc = QueryDocument::query().select([field("left"), field("right")]);

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let response = Executor::new(library())
        .execute(&doc, &Variables::new(), &ctx)
        .await;
    assert!(response.data.is_null());
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].kind, ErrorKind::InternalError);
}
