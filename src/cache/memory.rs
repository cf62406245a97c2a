//! Process-local fallback cache
//!
//! Always available. Entries carry an absolute epoch-millisecond expiry and
//! are absent once `now >= expires_at`. Expired entries are evicted lazily on
//! read, by [`MemoryFallbackCache::purge_expired`], or to make room when the
//! optional entry bound is reached.

use crate::clock::{duration_to_ms, SharedClock, SystemClock};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Serialized value plus its absolute expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// JSON text
    pub value: String,
    pub expires_at_epoch_ms: i64,
}

impl CacheEntry {
    pub fn is_live(&self, now_epoch_ms: i64) -> bool {
        self.expires_at_epoch_ms > now_epoch_ms
    }
}

#[derive(Debug)]
pub struct MemoryFallbackCache {
    entries: DashMap<String, CacheEntry>,
    clock: SharedClock,
    /// 0 = unbounded
    max_entries: usize,
}

impl MemoryFallbackCache {
    pub fn new(max_entries: usize, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            max_entries,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0, SystemClock::shared())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now_epoch_ms();
        {
            let entry = self.entries.get(key)?;
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        debug!(key = key, "Memory cache entry expired");
        None
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        let now = self.clock.now_epoch_ms();
        let entry = CacheEntry {
            value,
            expires_at_epoch_ms: now.saturating_add(duration_to_ms(ttl)),
        };

        if self.max_entries > 0
            && self.entries.len() >= self.max_entries
            && !self.entries.contains_key(key)
        {
            self.make_room(now);
        }

        self.entries.insert(key.to_string(), entry);
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_epoch_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Purge expired entries, then evict the one closest to expiry if still full
    fn make_room(&self, now: i64) {
        self.entries.retain(|_, entry| entry.is_live(now));
        if self.entries.len() < self.max_entries {
            return;
        }

        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at_epoch_ms)
            .map(|entry| entry.key().clone());

        if let Some(victim) = victim {
            self.entries.remove(&victim);
            debug!(
                key = %victim,
                max_entries = self.max_entries,
                "Memory cache full, evicted entry closest to expiry"
            );
        }
    }
}

impl Default for MemoryFallbackCache {
    fn default() -> Self {
        Self::unbounded()
    }
}
