//! Storage abstraction for vellum.
//!
//! Backend crates (e.g., vellum-store-sqlite, vellum-store-memory) implement the
//! [`Store`] trait so the guard core doesn't depend on any specific database
//! engine or schema details.

use thiserror::Error;

pub mod store;
pub mod types;

pub use store::Store;
pub use types::*;

#[cfg(feature = "test-support")]
pub use store::MockStore;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("backend error: {0}")]
    Backend(String),
}
