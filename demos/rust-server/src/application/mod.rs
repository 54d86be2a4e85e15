//! Application layer - Service wiring.

pub mod services;

pub use services::App;
