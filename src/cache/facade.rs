//! Tiered cache facade
//!
//! Walks an ordered tier list: `[Network, Memory]` in the long-lived regime,
//! `[Memory]` in the stateless regime. The network tier is consulted only
//! while the store reports itself alive; a store error sends the operation on
//! to the memory tier. Writes are best-effort and never fail the caller.
//! Deletes always reach the store under the tiered strategy, since the
//! liveness flag may lag behind the real connection.

use crate::cache::memory::MemoryFallbackCache;
use crate::config::{CacheConfig, ExecutionRegime};
use crate::logging::log_memory_fallback;
use crate::resilience::retry::{with_retry, RetryPolicy};
use crate::store::BackingStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tier composition, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStrategy {
    /// Backing store first, memory as fallback
    Tiered,
    /// Memory only; no network connection is used
    MemoryOnly,
}

impl CacheStrategy {
    pub fn for_regime(regime: ExecutionRegime) -> Self {
        match regime {
            ExecutionRegime::LongLived => Self::Tiered,
            ExecutionRegime::Stateless => Self::MemoryOnly,
        }
    }

    pub fn tiers(&self) -> &'static [CacheTier] {
        match self {
            Self::Tiered => &[CacheTier::Network, CacheTier::Memory],
            Self::MemoryOnly => &[CacheTier::Memory],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheTier {
    Network,
    Memory,
}

impl CacheTier {
    fn label(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Memory => "memory",
        }
    }
}

const JSON_NULL: &str = "null";

#[derive(Debug)]
pub struct CacheFacade {
    store: Arc<dyn BackingStore>,
    memory: Arc<MemoryFallbackCache>,
    strategy: CacheStrategy,
    retry: RetryPolicy,
    key_prefix: String,
    default_ttl: Duration,
}

impl CacheFacade {
    pub fn new(
        store: Arc<dyn BackingStore>,
        memory: Arc<MemoryFallbackCache>,
        strategy: CacheStrategy,
    ) -> Self {
        let defaults = CacheConfig::default();
        Self {
            store,
            memory,
            strategy,
            retry: RetryPolicy::default(),
            key_prefix: defaults.key_prefix.clone(),
            default_ttl: defaults.default_ttl(),
        }
    }

    /// Build from configuration for a resolved regime
    pub fn from_config(
        config: &CacheConfig,
        regime: ExecutionRegime,
        store: Arc<dyn BackingStore>,
        memory: Arc<MemoryFallbackCache>,
        retry: RetryPolicy,
    ) -> Self {
        let strategy = CacheStrategy::for_regime(regime);
        debug!(
            strategy = ?strategy,
            store = store.provider_name(),
            key_prefix = %config.key_prefix,
            "Cache facade initialized"
        );
        Self::new(store, memory, strategy)
            .with_retry_policy(retry)
            .with_key_prefix(config.key_prefix.clone())
            .with_default_ttl(config.default_ttl())
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn memory(&self) -> &Arc<MemoryFallbackCache> {
        &self.memory
    }

    /// Whether reads and writes currently reach the backing store
    pub fn is_network_tier_alive(&self) -> bool {
        self.strategy == CacheStrategy::Tiered && self.store.is_alive()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let key = self.full_key(key);

        for tier in self.strategy.tiers() {
            match tier {
                CacheTier::Network => {
                    if !self.store.is_alive() {
                        continue;
                    }
                    match with_retry(&self.retry, || self.store.get(&key)).await {
                        Ok(Some(raw)) => return decode(&key, &raw, *tier),
                        Ok(None) => {
                            debug!(key = %key, "Cache MISS");
                            return None;
                        }
                        Err(e) => {
                            log_memory_fallback(&key, "get", &e.to_string());
                        }
                    }
                }
                CacheTier::Memory => {
                    return self
                        .memory
                        .get(&key)
                        .and_then(|raw| decode(&key, &raw, *tier));
                }
            }
        }
        None
    }

    /// Best-effort write; a value serializing to JSON `null` deletes the key
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(raw) = encode(key, value) else {
            return;
        };
        if raw == JSON_NULL {
            self.delete(key).await;
            return;
        }
        self.set_raw(&self.full_key(key), raw, ttl).await;
    }

    /// Remove `key` from every tier regardless of store liveness; idempotent
    pub async fn delete(&self, key: &str) {
        let key = self.full_key(key);
        self.memory.delete(&key);

        if self.strategy == CacheStrategy::Tiered {
            if let Err(e) = with_retry(&self.retry, || self.store.delete(&key)).await {
                warn!(key = %key, error = %e, "Backing store DEL failed");
            }
        }
    }

    /// Read-through: return the cached value or fetch, cache and return it
    ///
    /// Fetch errors propagate unchanged and nothing is written. A fetched
    /// value serializing to `null` is returned but not cached.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, fetch: F, ttl: Duration) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let value = fetch().await?;

        if let Some(raw) = encode(key, &value) {
            if raw != JSON_NULL {
                self.set_raw(&self.full_key(key), raw, ttl).await;
            }
        }
        Ok(value)
    }

    async fn set_raw(&self, key: &str, raw: String, ttl: Duration) {
        for tier in self.strategy.tiers() {
            match tier {
                CacheTier::Network => {
                    if !self.store.is_alive() {
                        continue;
                    }
                    match with_retry(&self.retry, || self.store.set(key, &raw, ttl)).await {
                        Ok(()) => return,
                        Err(e) => log_memory_fallback(key, "set", &e.to_string()),
                    }
                }
                CacheTier::Memory => {
                    self.memory.set(key, raw, ttl);
                    return;
                }
            }
        }
    }
}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!(key = key, error = %e, "Failed to serialize cache value, skipping write");
            None
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str, tier: CacheTier) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => {
            debug!(key = key, tier = tier.label(), "Cache HIT");
            Some(value)
        }
        Err(e) => {
            warn!(
                key = key,
                tier = tier.label(),
                error = %e,
                "Cached value failed to deserialize, treating as miss"
            );
            None
        }
    }
}
