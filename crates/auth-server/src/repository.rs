//! Storage abstraction for user documents.
//!
//! Handlers and strategies only see [`UserStore`]; the MongoDB implementation
//! lives in [`crate::db`] and an in-memory one backs the tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AuthProvider, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write. Carries the identity that clashed.
    #[error("{0} already exists")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

/// Persistence operations the auth flows need.
///
/// Implementations must enforce one record per credential identity:
/// `(local, username)` and `(provider, provider_id)` are unique, and
/// violating either yields [`StoreError::Duplicate`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Look up a local (password) account by username.
    async fn find_local(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_provider(
        &self,
        provider: AuthProvider,
        subject: &str,
    ) -> Result<Option<User>, StoreError>;
}
