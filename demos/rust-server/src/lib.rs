//! arbor example server
//!
//! Authors and books served from memory, movies and watch progress from
//! REST backends, and repository comments pushed to subscribers.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::App;
