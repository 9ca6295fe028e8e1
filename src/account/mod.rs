//! Account records and the lookup capability the login flow depends on.
//!
//! The login pipeline only ever reads accounts, one at a time, by username.
//! [`AccountStore`] is that capability; [`PgAccountStore`] backs it with
//! `PostgreSQL` and [`MemoryAccountStore`] keeps records in process for tests
//! and local runs.

mod memory;
mod models;
mod postgres;

pub use memory::MemoryAccountStore;
pub use models::{AccountRecord, Address, PublicAccount, Role, UnknownRole};
pub use postgres::{ConnectOptions, PgAccountStore};

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The datastore cannot be reached (connection refused, pool closed, timeout).
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
    /// A stored row exists but cannot be decoded into an account.
    #[error("corrupt account record: {0}")]
    Corrupt(String),
    /// The datastore refused the request: bad DSN, failed authentication,
    /// missing table and the like. Retrying will not help.
    #[error("datastore rejected the request: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch one account by its exact (case-sensitive) username.
    ///
    /// `Ok(None)` means no such account; it is not an error.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] when the datastore cannot answer and
    /// [`StoreError::Corrupt`] when the stored row is unreadable.
    /// [`StoreError::Rejected`] covers queries the datastore refused.
    async fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>, StoreError>;

    /// Round-trip to the datastore without reading any account.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] when the datastore cannot answer.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release the underlying connections. Later lookups fail with
    /// [`StoreError::Unavailable`].
    async fn close(&self);
}
