//! GraphQL schema and resolvers.

use crate::domain::*;
use crate::infrastructure::*;
use arbor_runtime::scalar::DateScalar;
use arbor_runtime::{
    DataLoader, FieldDef, InputObjectDef, InputValueDef, InterfaceDef, ObjectDef, ResolverError,
    ResolverResult, SchemaError, TypeRef, TypeRegistry, UnionDef,
};
use arbor_sdk::{PubSubHub, TypedTopic};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Topic carrying every new comment.
pub const COMMENT_ADDED: &str = "COMMENT_ADDED";

/// Per-request loader of the books written by an author.
pub type BookLoader = DataLoader<AuthorId, Vec<Book>>;

/// Per-request loader of watch progress by movie id.
pub type ProgressLoader = DataLoader<String, Progress>;

/// Dependencies shared by every resolver.
#[derive(Clone)]
pub struct Resolvers {
    pub authors: Arc<dyn AuthorRepository>,
    pub books: Arc<dyn BookRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub movies: MoviesApi,
}

fn to_json<T: Serialize>(value: &T) -> ResolverResult {
    serde_json::to_value(value).map_err(|e| ResolverError::Internal(e.to_string()))
}

fn kind_of(value: &Value) -> Option<String> {
    value.get("kind")?.as_str().map(String::from)
}

fn id_of(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Builds the type registry with every resolver bound.
pub fn registry(resolvers: Resolvers) -> Result<TypeRegistry, SchemaError> {
    let Resolvers {
        authors,
        books,
        comments,
        movies,
    } = resolvers;

    let author_lookup = Arc::clone(&authors);
    let movie_source = movies.clone();
    let viewed_source = movies.clone();
    let recommended_source = movies.clone();
    let search_books = Arc::clone(&books);
    let search_movies = movies;
    let comment_list = Arc::clone(&comments);

    TypeRegistry::builder()
        .scalar("Date", Arc::new(DateScalar))
        .query_type("Query")
        .mutation_type("Mutation")
        .subscription_type("Subscription")
        .add_type(
            InterfaceDef::new("Media")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("title", TypeRef::named("String"))),
        )
        .add_type(
            ObjectDef::new("Book")
                .implements("Media")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("title", TypeRef::named("String")))
                .field(FieldDef::new("author", TypeRef::nullable("Author"))),
        )
        .add_type(
            ObjectDef::new("Author")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("name", TypeRef::named("String")))
                .field(FieldDef::new("books", TypeRef::list(TypeRef::named("Book")))),
        )
        .add_type(
            ObjectDef::new("Movie")
                .implements("Media")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("title", TypeRef::named("String")))
                .field(FieldDef::new("releaseDate", TypeRef::nullable("Date")))
                .field(FieldDef::new("progress", TypeRef::nullable("Progress"))),
        )
        .add_type(
            ObjectDef::new("Progress")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("percent", TypeRef::named("Int"))),
        )
        .add_type(UnionDef::new("SearchResult").member("Book").member("Movie"))
        .add_type(
            ObjectDef::new("Comment")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("repoName", TypeRef::named("String")))
                .field(FieldDef::new("content", TypeRef::named("String")))
                .field(FieldDef::new("createdAt", TypeRef::named("Date"))),
        )
        .add_type(
            InputObjectDef::new("AddCommentInput")
                .field(InputValueDef::new("repoFullName", TypeRef::named("String")))
                .field(InputValueDef::new("content", TypeRef::named("String"))),
        )
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("getAuthors", TypeRef::list(TypeRef::named("Author"))))
                .field(
                    FieldDef::new("author", TypeRef::named("Author"))
                        .argument(InputValueDef::new("id", TypeRef::named("ID"))),
                )
                .field(
                    FieldDef::new("movie", TypeRef::named("Movie"))
                        .argument(InputValueDef::new("id", TypeRef::named("ID"))),
                )
                .field(
                    FieldDef::new("mostViewedMovies", TypeRef::list(TypeRef::named("Movie")))
                        .argument(
                            InputValueDef::new("limit", TypeRef::nullable("Int")).default_value(10),
                        ),
                )
                .field(FieldDef::new("recommended", TypeRef::nullable("Media")))
                .field(
                    FieldDef::new("search", TypeRef::list(TypeRef::named("SearchResult")))
                        .argument(InputValueDef::new("term", TypeRef::named("String"))),
                )
                .field(
                    FieldDef::new("comments", TypeRef::list(TypeRef::named("Comment")))
                        .argument(InputValueDef::new("repoFullName", TypeRef::named("String"))),
                ),
        )
        .add_type(
            ObjectDef::new("Mutation")
                .field(
                    FieldDef::new("addComment", TypeRef::named("Comment"))
                        .argument(InputValueDef::new("input", TypeRef::named("AddCommentInput"))),
                )
                .field(
                    FieldDef::new("userInputError", TypeRef::nullable("String"))
                        .argument(InputValueDef::new("input", TypeRef::nullable("String"))),
                ),
        )
        .add_type(
            ObjectDef::new("Subscription").field(
                FieldDef::new("commentAdded", TypeRef::named("Comment"))
                    .argument(InputValueDef::new("repoFullName", TypeRef::named("String"))),
            ),
        )
        .discriminator("Media", kind_of)
        .discriminator("SearchResult", kind_of)
        // Query
        .resolver_async("Query", "getAuthors", move |_, _, _, _| {
            let authors = Arc::clone(&authors);
            async move { to_json(&authors.find_all().await) }
        })
        .resolver_async("Query", "author", {
            let authors = Arc::clone(&author_lookup);
            move |_, args, _, _| {
                let authors = Arc::clone(&authors);
                async move {
                    let id: String = args.require("id")?;
                    let author = authors
                        .find_by_id(&AuthorId::new(id.as_str()))
                        .await
                        .ok_or(DomainError::AuthorNotFound(id))?;
                    to_json(&author)
                }
            }
        })
        .resolver_async("Query", "movie", move |_, args, ctx, _| {
            let movies = movie_source.clone();
            async move {
                let id: String = args.require("id")?;
                movies.get_movie(&id, &ctx).await
            }
        })
        .resolver_async("Query", "mostViewedMovies", move |_, args, ctx, _| {
            let movies = viewed_source.clone();
            async move {
                let limit = args.get_as::<i32>("limit").unwrap_or(10);
                Ok(Value::Array(movies.most_viewed(limit, &ctx).await?))
            }
        })
        .resolver_async("Query", "recommended", move |_, _, ctx, _| {
            let movies = recommended_source.clone();
            async move {
                let viewed = movies.most_viewed(1, &ctx).await?;
                Ok(viewed.into_iter().next().unwrap_or(Value::Null))
            }
        })
        .resolver_async("Query", "search", move |_, args, ctx, _| {
            let books = Arc::clone(&search_books);
            let movies = search_movies.clone();
            async move {
                let term: String = args.require("term")?;
                let needle = term.to_lowercase();

                let mut results = Vec::new();
                for book in books.search(&term).await {
                    results.push(to_json(&book)?);
                }
                results.extend(movies.most_viewed(50, &ctx).await?.into_iter().filter(|movie| {
                    movie["title"]
                        .as_str()
                        .is_some_and(|title| title.to_lowercase().contains(&needle))
                }));
                Ok(Value::Array(results))
            }
        })
        .resolver_async("Query", "comments", move |_, args, _, _| {
            let comments = Arc::clone(&comment_list);
            async move {
                let repo: String = args.require("repoFullName")?;
                to_json(&comments.find_by_repo(&repo).await)
            }
        })
        // Author
        .resolver_async("Author", "books", |parent, _, ctx, _| async move {
            let id = id_of(&parent)
                .map(AuthorId::new)
                .ok_or_else(|| ResolverError::Internal("author without id".into()))?;
            let loader = ctx
                .get::<BookLoader>()
                .ok_or_else(|| ResolverError::Internal("book loader missing".into()))?;
            to_json(&loader.load(id).await?.unwrap_or_default())
        })
        // Book
        .resolver_async("Book", "author", move |parent, _, _, _| {
            let authors = Arc::clone(&author_lookup);
            async move {
                let Some(id) = parent["authorId"].as_str() else {
                    return Ok(Value::Null);
                };
                to_json(&authors.find_by_id(&AuthorId::new(id)).await)
            }
        })
        // Movie
        .resolver_async("Movie", "progress", |parent, _, ctx, _| async move {
            let Some(id) = id_of(&parent) else {
                return Ok(Value::Null);
            };
            let loader = ctx
                .get::<ProgressLoader>()
                .ok_or_else(|| ResolverError::Internal("progress loader missing".into()))?;
            to_json(&loader.load(id).await?)
        })
        // Mutation
        .resolver_async("Mutation", "addComment", move |_, args, ctx, _| {
            let comments = Arc::clone(&comments);
            async move {
                let input: AddCommentInput = args.require("input")?;
                if input.content.trim().is_empty() {
                    return Err(DomainError::validation(
                        "input",
                        "Comment content must not be empty",
                    )
                    .into());
                }

                let comment = comments.create(input.repo_full_name, input.content).await;
                let hub = ctx
                    .get::<PubSubHub>()
                    .ok_or_else(|| ResolverError::Internal("pubsub hub missing".into()))?;
                let delivered = TypedTopic::<Comment>::new(hub.clone(), COMMENT_ADDED).publish(&comment);
                tracing::debug!(id = %comment.id.0, delivered, "comment added");

                to_json(&comment)
            }
        })
        .resolver_fn("Mutation", "userInputError", |_, args, _, _| {
            match args.get_as::<String>("input").as_deref() {
                Some("expected") => Ok(Value::from("expected")),
                _ => Err(DomainError::validation("input", "Form Arguments invalid").into()),
            }
        })
        .build()
}
