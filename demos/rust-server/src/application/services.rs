//! Application services - wiring repositories, backends and the server.

use crate::domain::*;
use crate::infrastructure::*;
use crate::presentation::*;
use arbor_runtime::{create_loader, Context, ContextBuilder};
use arbor_sdk::{PubSubHub, SdkResult, Server, ServerConfig, Transport, TypedTopic};
use std::sync::Arc;

/// The example application: one server plus the state its per-request
/// contexts are built from.
pub struct App {
    server: Server,
    library: Arc<InMemoryLibrary>,
    personalization: PersonalizationApi,
}

impl App {
    pub fn new(config: ServerConfig, transport: Arc<dyn Transport>) -> SdkResult<Self> {
        let hub = PubSubHub::with_config(config.pubsub.clone());
        let library = Arc::new(InMemoryLibrary::with_seed_data());
        let comments: Arc<dyn CommentRepository> = Arc::new(InMemoryCommentRepository::new());
        let movies = MoviesApi::new(&config, Arc::clone(&transport));
        let personalization = PersonalizationApi::new(&config, transport);

        let registry = registry(Resolvers {
            authors: library.clone(),
            books: library.clone(),
            comments,
            movies,
        })?;

        let comment_topic = TypedTopic::<Comment>::new(hub.clone(), COMMENT_ADDED);
        let server = Server::builder()
            .registry(registry)
            .config(config)
            .pubsub(hub)
            .subscription("commentAdded", move |args, _| {
                let repo: String = args.require("repoFullName")?;
                Ok(comment_topic
                    .subscribe(move |comment| comment.repo_name == repo)
                    .into())
            })
            .build()?;

        Ok(Self {
            server,
            library,
            personalization,
        })
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn library(&self) -> &InMemoryLibrary {
        &self.library
    }

    /// Builds a fresh request context with its own loaders, authenticated
    /// with the configured token.
    pub fn context(&self) -> Context {
        self.build_context(|| self.server.context())
    }

    /// Builds a request context for a caller presenting `token`.
    pub fn context_with_token(&self, token: &str) -> Context {
        self.build_context(|| self.server.context().auth_token(token))
    }

    /// `base` yields the request's prefilled builder. Loaders cannot hold the
    /// context they live in, so they get a second context built from the
    /// same prefill.
    fn build_context(&self, base: impl Fn() -> ContextBuilder) -> Context {
        let library = Arc::clone(&self.library);
        let books: BookLoader = create_loader(move |ids: Vec<AuthorId>| {
            let library = Arc::clone(&library);
            async move {
                let mut found = library.find_by_authors(&ids).await;
                Ok(ids
                    .iter()
                    .map(|id| Some(found.remove(id).unwrap_or_default()))
                    .collect())
            }
        });

        let personalization = self.personalization.clone();
        let requester = base().build();
        let progress: ProgressLoader = create_loader(move |ids: Vec<String>| {
            let personalization = personalization.clone();
            let requester = requester.clone();
            async move { personalization.progress_for(&ids, &requester).await }
        });

        base().insert(books).insert(progress).build()
    }

    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}
