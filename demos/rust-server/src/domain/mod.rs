//! Domain layer - Core business entities and rules.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
