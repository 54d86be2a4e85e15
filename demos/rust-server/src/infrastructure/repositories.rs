//! Repository implementations - Data access layer.

use crate::domain::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

// Repository Traits
#[async_trait]
pub trait AuthorRepository: Send + Sync {
    async fn find_by_id(&self, id: &AuthorId) -> Option<Author>;
    async fn find_all(&self) -> Vec<Author>;
}

#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn find_by_authors(&self, ids: &[AuthorId]) -> HashMap<AuthorId, Vec<Book>>;
    async fn search(&self, term: &str) -> Vec<Book>;
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, repo_name: String, content: String) -> Comment;
    async fn find_by_repo(&self, repo_name: &str) -> Vec<Comment>;
}

// In-Memory Library
pub struct InMemoryLibrary {
    authors: Vec<Author>,
    books: Vec<Book>,
    batch_calls: AtomicUsize,
}

impl InMemoryLibrary {
    pub fn with_seed_data() -> Self {
        let authors = [("author_1", "J.K. Rowling"), ("author_2", "Michael Crichton")]
            .into_iter()
            .map(|(id, name)| Author {
                id: AuthorId::new(id),
                name: name.to_string(),
            })
            .collect();

        let books = [
            ("book_1", "Harry Potter and the Chamber of Secrets", "author_1"),
            ("book_2", "Jurassic Park", "author_2"),
        ]
        .into_iter()
        .map(|(id, title, author)| Book {
            id: id.to_string(),
            title: title.to_string(),
            author_id: AuthorId::new(author),
        })
        .collect();

        Self {
            authors,
            books,
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `find_by_authors` calls so far.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorRepository for InMemoryLibrary {
    async fn find_by_id(&self, id: &AuthorId) -> Option<Author> {
        self.authors.iter().find(|a| &a.id == id).cloned()
    }

    async fn find_all(&self) -> Vec<Author> {
        self.authors.clone()
    }
}

#[async_trait]
impl BookRepository for InMemoryLibrary {
    async fn find_by_authors(&self, ids: &[AuthorId]) -> HashMap<AuthorId, Vec<Book>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(authors = ids.len(), "loading books");

        let mut found: HashMap<AuthorId, Vec<Book>> = HashMap::new();
        for book in self.books.iter().filter(|b| ids.contains(&b.author_id)) {
            found
                .entry(book.author_id.clone())
                .or_default()
                .push(book.clone());
        }
        found
    }

    async fn search(&self, term: &str) -> Vec<Book> {
        let term = term.to_lowercase();
        self.books
            .iter()
            .filter(|b| b.title.to_lowercase().contains(&term))
            .cloned()
            .collect()
    }
}

// In-Memory Comment Repository
pub struct InMemoryCommentRepository {
    comments: RwLock<Vec<Comment>>,
    next_id: AtomicU64,
}

impl InMemoryCommentRepository {
    pub fn new() -> Self {
        Self {
            comments: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryCommentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommentRepository for InMemoryCommentRepository {
    async fn create(&self, repo_name: String, content: String) -> Comment {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let comment = Comment {
            id: CommentId::new(format!("comment_{id}")),
            repo_name,
            content,
            created_at: Utc::now(),
        };
        self.comments.write().await.push(comment.clone());
        comment
    }

    async fn find_by_repo(&self, repo_name: &str) -> Vec<Comment> {
        self.comments
            .read()
            .await
            .iter()
            .filter(|c| c.repo_name == repo_name)
            .cloned()
            .collect()
    }
}
