//! Unavailable store provider
//!
//! Never alive. Every command fails with `StoreError::Unavailable`. Used when
//! the network tier is disabled, when the stateless regime forbids pooled
//! connections, or when the initial connection could not be established.

use crate::store::errors::{StoreError, StoreResult};
use crate::store::traits::BackingStore;
use async_trait::async_trait;
use std::time::Duration;

/// Store that is permanently down
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn unavailable<T>(&self) -> StoreResult<T> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }
}

impl Default for UnavailableStore {
    fn default() -> Self {
        Self::new("no backing store configured")
    }
}

#[async_trait]
impl BackingStore for UnavailableStore {
    fn is_alive(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        self.unavailable()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<()> {
        self.unavailable()
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        self.unavailable()
    }

    async fn incr(&self, _key: &str) -> StoreResult<i64> {
        self.unavailable()
    }

    async fn pexpire(&self, _key: &str, _ttl: Duration) -> StoreResult<bool> {
        self.unavailable()
    }

    async fn pttl(&self, _key: &str) -> StoreResult<i64> {
        self.unavailable()
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(false)
    }

    fn provider_name(&self) -> &'static str {
        "unavailable"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}
