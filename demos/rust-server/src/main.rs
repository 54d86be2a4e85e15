//! arbor example server
//!
//! Runs the example operations against in-memory backends and prints the
//! responses. Configuration comes from `ARBOR_*` environment variables.
//!
//! # Running
//! ```bash
//! cd demos/rust-server && RUST_LOG=arbor=debug cargo run
//! ```

use arbor_example_server::infrastructure::FixtureTransport;
use arbor_example_server::App;
use arbor_runtime::{field, QueryDocument, Variables};
use arbor_sdk::{SdkResult, ServerConfig};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> SdkResult<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arbor=info")),
        )
        .with_target(false)
        .compact()
        .init();

    let mut config = ServerConfig::from_env()?;
    if config.token.is_none() {
        config.token = Some("foo".to_string());
    }
    info!(env = %config.env, "configuration loaded");

    let app = App::new(config, Arc::new(FixtureTransport::with_seed_data()))?;
    let server = app.server();

    let authors = QueryDocument::query().named("GetAuthors").select([field("getAuthors")
        .select([field("name"), field("books").select([field("title")])])]);
    let body = server
        .execute_json(&authors, &Variables::new(), &app.context())
        .await;
    println!("{body:#}");

    let subscription = QueryDocument::subscription().select([field("commentAdded")
        .arg("repoFullName", "arbor/arbor")
        .select([field("id"), field("content"), field("createdAt")])]);
    let ctx = app.context();
    let mut comments = match server.subscribe(&subscription, &Variables::new(), &ctx) {
        Ok(stream) => stream,
        Err(response) => {
            println!("{:#}", response.into_json());
            return Ok(());
        }
    };

    let add_comment = QueryDocument::mutation().select([field("addComment")
        .arg(
            "input",
            json!({"repoFullName": "arbor/arbor", "content": "Ship it"}),
        )
        .select([field("id")])]);
    let body = server
        .execute_json(&add_comment, &Variables::new(), &app.context())
        .await;
    println!("{body:#}");

    if let Some(event) = comments.next().await {
        println!("{:#}", event.into_json());
    }

    app.shutdown();
    Ok(())
}
