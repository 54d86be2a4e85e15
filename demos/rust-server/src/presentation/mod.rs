//! Presentation layer - GraphQL schema and resolvers.

pub mod resolvers;

pub use resolvers::{registry, BookLoader, ProgressLoader, Resolvers, COMMENT_ADDED};
