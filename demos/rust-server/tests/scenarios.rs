//! End-to-end scenarios against the example application.

use arbor_example_server::infrastructure::{FixtureTransport, MOVIES_DEV_URL};
use arbor_example_server::App;
use arbor_runtime::{
    field, on, var, ErrorKind, PathSegment, QueryDocument, Selection, TypeRef, Variables,
};
use arbor_sdk::ServerConfig;
use serde_json::json;
use std::sync::Arc;

fn app() -> (App, Arc<FixtureTransport>) {
    let transport = Arc::new(FixtureTransport::with_seed_data());
    let app = App::new(ServerConfig::new().token("foo"), transport.clone()).unwrap();
    (app, transport)
}

fn add_comment(repo: &str, content: &str) -> QueryDocument {
    QueryDocument::mutation().select([field("addComment")
        .arg("input", json!({"repoFullName": repo, "content": content}))
        .select([field("id")])])
}

#[tokio::test]
async fn test_authors_with_books() {
    let (app, _) = app();
    let doc = QueryDocument::query()
        .select([field("getAuthors").select([field("name"), field("books").select([field("title")])])]);

    let body = app
        .server()
        .execute_json(&doc, &Variables::new(), &app.context())
        .await;

    assert_eq!(
        body,
        json!({"data": {"getAuthors": [
            {"name": "J.K. Rowling", "books": [{"title": "Harry Potter and the Chamber of Secrets"}]},
            {"name": "Michael Crichton", "books": [{"title": "Jurassic Park"}]}
        ]}})
    );
    // Both authors' books come from one repository call.
    assert_eq!(app.library().batch_calls(), 1);
}

#[tokio::test]
async fn test_failing_movie_backend_nulls_root() {
    let (app, transport) = app();
    transport.fail("movies/7", 503);
    let doc = QueryDocument::query().select([field("movie").arg("id", "7").select([field("title")])]);

    let response = app
        .server()
        .execute(&doc, &Variables::new(), &app.context())
        .await;

    assert!(response.data.is_null());
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].kind, ErrorKind::UpstreamError);
    assert_eq!(response.errors[0].path, Some(vec![PathSegment::from("movie")]));
}

#[tokio::test]
async fn test_movie_with_progress() {
    let (app, transport) = app();
    let doc = QueryDocument::query()
        .variable("id", TypeRef::named("ID"))
        .select([field("movie").arg("id", var("id")).select([
            field("title"),
            field("releaseDate"),
            field("progress").select([field("percent")]),
        ])]);
    let mut variables = Variables::new();
    variables.insert("id".into(), json!(1));

    let body = app
        .server()
        .execute_json(&doc, &variables, &app.context())
        .await;
    assert_eq!(
        body,
        json!({"data": {"movie": {
            "title": "Jurassic Park",
            "releaseDate": 739_584_000,
            "progress": {"percent": 40}
        }}})
    );

    let requests = transport.requests();
    assert_eq!(requests[0].url, format!("{MOVIES_DEV_URL}movies/1"));
    assert!(requests
        .iter()
        .all(|r| r.headers.get("Authorization").map(String::as_str) == Some("foo")));
}

#[tokio::test]
async fn test_progress_is_batched_across_movies() {
    let (app, transport) = app();
    let doc = QueryDocument::query().select([field("mostViewedMovies")
        .select([field("title"), field("progress").select([field("percent")])])]);

    let body = app
        .server()
        .execute_json(&doc, &Variables::new(), &app.context())
        .await;
    assert_eq!(
        body,
        json!({"data": {"mostViewedMovies": [
            {"title": "Jurassic Park", "progress": {"percent": 40}},
            {"title": "Sphere", "progress": {"percent": 100}}
        ]}})
    );

    let requests = transport.requests();
    let listing = &requests[0];
    assert_eq!(
        listing.query,
        vec![
            ("per_page".to_string(), "10".to_string()),
            ("order_by".to_string(), "most_viewed".to_string())
        ]
    );
    let progress: Vec<_> = requests.iter().filter(|r| r.url.ends_with("progress")).collect();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].query, vec![("ids".to_string(), "1,2".to_string())]);
}

#[tokio::test]
async fn test_progress_uses_the_request_token() {
    let (app, transport) = app();
    let doc = QueryDocument::query().select([field("movie")
        .arg("id", "2")
        .select([field("progress").select([field("percent")])])]);

    let body = app
        .server()
        .execute_json(&doc, &Variables::new(), &app.context_with_token("viewer-42"))
        .await;
    assert_eq!(body, json!({"data": {"movie": {"progress": {"percent": 100}}}}));

    let requests = transport.requests();
    let progress = requests
        .iter()
        .find(|r| r.url.ends_with("progress"))
        .unwrap();
    assert_eq!(
        progress.headers.get("Authorization").map(String::as_str),
        Some("viewer-42")
    );
}

#[tokio::test]
async fn test_search_resolves_union_members() {
    let (app, _) = app();
    let doc = QueryDocument::query().select([field("search").arg("term", "jurassic").select([
        Selection::from(field("__typename")),
        on("Book").select([field("title"), field("author").select([field("name")])]).into(),
        on("Movie").select([field("releaseDate")]).into(),
    ])]);

    let body = app
        .server()
        .execute_json(&doc, &Variables::new(), &app.context())
        .await;
    assert_eq!(
        body,
        json!({"data": {"search": [
            {"__typename": "Book", "title": "Jurassic Park", "author": {"name": "Michael Crichton"}},
            {"__typename": "Movie", "releaseDate": 739_584_000}
        ]}})
    );
}

#[tokio::test]
async fn test_unknown_author_is_not_found() {
    let (app, _) = app();
    let doc = QueryDocument::query().select([field("author").arg("id", "author_9").select([field("name")])]);

    let response = app
        .server()
        .execute(&doc, &Variables::new(), &app.context())
        .await;
    assert!(response.data.is_null());
    assert_eq!(response.errors[0].kind, ErrorKind::NotFoundError);
    assert_eq!(response.errors[0].message, "Author not found: author_9");
}

#[tokio::test]
async fn test_comment_subscription_is_filtered_by_repo() {
    let (app, _) = app();
    let server = app.server();
    let subscription = QueryDocument::subscription().select([field("commentAdded")
        .arg("repoFullName", "x")
        .select([field("content"), field("repoName")])]);

    let mut stream = server
        .subscribe(&subscription, &Variables::new(), &app.context())
        .unwrap();

    for (repo, content) in [("x", "first"), ("y", "elsewhere"), ("x", "second")] {
        let response = server
            .execute(&add_comment(repo, content), &Variables::new(), &app.context())
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
    }

    let first = stream.next().await.unwrap().into_json();
    assert_eq!(
        first,
        json!({"data": {"commentAdded": {"content": "first", "repoName": "x"}}})
    );
    let second = stream.next().await.unwrap().into_json();
    assert_eq!(
        second,
        json!({"data": {"commentAdded": {"content": "second", "repoName": "x"}}})
    );

    let stored = QueryDocument::query().select([field("comments")
        .arg("repoFullName", "y")
        .select([field("content")])]);
    let body = server
        .execute_json(&stored, &Variables::new(), &app.context())
        .await;
    assert_eq!(body, json!({"data": {"comments": [{"content": "elsewhere"}]}}));

    app.shutdown();
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_empty_comment_is_rejected() {
    let (app, _) = app();
    let response = app
        .server()
        .execute(&add_comment("x", "  "), &Variables::new(), &app.context())
        .await;

    assert!(response.data.is_null());
    assert_eq!(response.errors[0].kind, ErrorKind::UserInputError);
    assert_eq!(response.errors[0].extension("argumentName"), Some(&json!("input")));
}

#[tokio::test]
async fn test_user_input_error() {
    let (app, _) = app();
    let mutation = |input: &str| {
        QueryDocument::mutation().select([field("userInputError").arg("input", input)])
    };

    let response = app
        .server()
        .execute(&mutation("unexpected"), &Variables::new(), &app.context())
        .await;
    assert_eq!(response.data.clone().into_json(), json!({"userInputError": null}));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].kind, ErrorKind::UserInputError);
    assert_eq!(response.errors[0].message, "Form Arguments invalid");
    assert_eq!(response.errors[0].extension("argumentName"), Some(&json!("input")));
    assert_eq!(
        response.errors[0].path,
        Some(vec![PathSegment::from("userInputError")])
    );

    let response = app
        .server()
        .execute(&mutation("expected"), &Variables::new(), &app.context())
        .await;
    assert!(response.errors.is_empty());
    assert_eq!(response.into_json(), json!({"data": {"userInputError": "expected"}}));
}
