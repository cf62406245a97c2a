//! In-process store provider
//!
//! Implements the full command set (GET/SET PX/DEL/INCR/PEXPIRE/PTTL/PING)
//! against a `DashMap`, with the same expiry semantics as the network store.
//! State is not shared across processes. Liveness can be toggled so tests can
//! simulate an outage without a server.

use crate::clock::{duration_to_ms, SharedClock, SystemClock};
use crate::store::errors::{StoreError, StoreResult};
use crate::store::traits::{BackingStore, PTTL_MISSING, PTTL_NO_EXPIRY};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at_epoch_ms: Option<i64>,
}

impl StoredValue {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at_epoch_ms.is_some_and(|at| now >= at)
    }
}

/// Process-local backing store
#[derive(Debug)]
pub struct LocalStore {
    entries: DashMap<String, StoredValue>,
    clock: SharedClock,
    alive: AtomicBool,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            alive: AtomicBool::new(true),
        }
    }

    /// Simulate transport loss: commands fail with `ECONNREFUSED`
    pub fn mark_down(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Restore the simulated transport
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Number of stored keys, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_alive(&self) -> StoreResult<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::connection(
                "ECONNREFUSED",
                "local store marked down",
            ))
        }
    }

    fn now(&self) -> i64 {
        self.clock.now_epoch_ms()
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for LocalStore {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.ensure_alive()?;
        let now = self.now();
        let value = match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().is_expired(now) => {
                entry.remove();
                None
            }
            Entry::Occupied(entry) => Some(entry.get().value.clone()),
            Entry::Vacant(_) => None,
        };
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.ensure_alive()?;
        let expires_at = self.now().saturating_add(duration_to_ms(ttl));
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at_epoch_ms: Some(expires_at),
            },
        );
        debug!(key = key, "Local store SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.ensure_alive()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.ensure_alive()?;
        let now = self.now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(StoredValue {
                        value: "1".to_string(),
                        expires_at_epoch_ms: None,
                    });
                    return Ok(1);
                }
                let current: i64 = entry.get().value.parse().map_err(|_| {
                    StoreError::backend(Some("ERR"), "value is not an integer or out of range")
                })?;
                let next = current.checked_add(1).ok_or_else(|| {
                    StoreError::backend(Some("ERR"), "increment or decrement would overflow")
                })?;
                entry.get_mut().value = next.to_string();
                Ok(next)
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredValue {
                    value: "1".to_string(),
                    expires_at_epoch_ms: None,
                });
                Ok(1)
            }
        }
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.ensure_alive()?;
        let now = self.now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().is_expired(now) => {
                entry.remove();
                Ok(false)
            }
            Entry::Occupied(mut entry) => {
                entry.get_mut().expires_at_epoch_ms =
                    Some(now.saturating_add(duration_to_ms(ttl)));
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn pttl(&self, key: &str) -> StoreResult<i64> {
        self.ensure_alive()?;
        let now = self.now();
        let ttl = match self.entries.get(key) {
            None => PTTL_MISSING,
            Some(entry) => match entry.expires_at_epoch_ms {
                None => PTTL_NO_EXPIRY,
                Some(at) if now >= at => PTTL_MISSING,
                Some(at) => at - now,
            },
        };
        Ok(ttl)
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(self.is_alive())
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_at(start: i64) -> (LocalStore, std::sync::Arc<ManualClock>) {
        let clock = ManualClock::new(start);
        (LocalStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_get_and_expiry() {
        let (store, clock) = store_at(0);
        store
            .set("article:1", "{\"id\":1}", Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(
            store.get("article:1").await.unwrap().as_deref(),
            Some("{\"id\":1}")
        );

        clock.advance(Duration::from_millis(100));
        assert_eq!(store.get("article:1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_incr_pexpire_pttl() {
        let (store, clock) = store_at(1_000);

        assert_eq!(store.pttl("counter").await.unwrap(), PTTL_MISSING);
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.pttl("counter").await.unwrap(), PTTL_NO_EXPIRY);

        assert!(store
            .pexpire("counter", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(store.incr("counter").await.unwrap(), 2);
        assert_eq!(store.pttl("counter").await.unwrap(), 60_000);

        clock.advance(Duration::from_secs(60));
        assert_eq!(store.pttl("counter").await.unwrap(), PTTL_MISSING);
        assert_eq!(store.incr("counter").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pexpire_missing_key() {
        let (store, _clock) = store_at(0);
        assert!(!store
            .pexpire("missing", Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_incr_non_integer_is_backend_error() {
        let (store, _clock) = store_at(0);
        store
            .set("text", "hello", Duration::from_secs(10))
            .await
            .unwrap();
        let err = store.incr("text").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_mark_down_fails_commands() {
        let (store, _clock) = store_at(0);
        store.mark_down();
        assert!(!store.is_alive());

        let err = store.get("key").await.unwrap_err();
        assert!(err.is_connection_error());

        store.mark_alive();
        assert!(store.get("key").await.unwrap().is_none());
    }
}
