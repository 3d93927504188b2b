//! tillbook-core: Shared infrastructure for the tillbook back end.
pub mod config;
pub mod error;
pub mod observability;

pub use tracing;
pub use validator;
