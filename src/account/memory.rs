//! In-process account store for tests and local runs.

use super::{AccountRecord, AccountStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, AccountRecord>,
    closed: AtomicBool,
    lookup_delay: Option<Duration>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_account(self, record: AccountRecord) -> Self {
        self.insert(record);
        self
    }

    /// Make every lookup sleep first, to simulate a slow datastore.
    #[must_use]
    pub const fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    pub fn insert(&self, record: AccountRecord) {
        self.accounts.insert(record.username.clone(), record);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            Err(StoreError::Unavailable("store closed".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>, StoreError> {
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        self.ensure_open()?;
        Ok(self.accounts.get(username).map(|entry| entry.value().clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
