//! Infrastructure layer - Repositories and backend clients.

pub mod datasources;
pub mod repositories;

pub use datasources::*;
pub use repositories::*;
