//! # Backing Store
//!
//! The network key/value store shared across processes for cache entries and
//! rate-limit counters. [`BackingStore`] is a dyn-compatible async trait so the
//! rest of the crate holds an `Arc<dyn BackingStore>` regardless of provider.
//!
//! [`create_store`] picks the provider from configuration and the execution
//! regime. It never fails: an unusable configuration degrades to
//! [`UnavailableStore`] and callers run on their memory tiers.

pub mod errors;
pub mod providers;
pub mod traits;

pub use errors::{StoreError, StoreResult};
pub use providers::{LocalStore, UnavailableStore};
pub use traits::{BackingStore, PTTL_MISSING, PTTL_NO_EXPIRY};

#[cfg(feature = "store-redis")]
pub use providers::RedisStore;

use crate::clock::SharedClock;
use crate::config::{ExecutionRegime, StoreConfig};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the backing store for a regime, degrading gracefully
///
/// The stateless regime never opens a network connection. For network
/// backends an initial connect is attempted once; if it fails the store is
/// still returned (down) and its reconnect task restores it later.
pub async fn create_store(
    config: &StoreConfig,
    regime: ExecutionRegime,
    clock: SharedClock,
) -> Arc<dyn BackingStore> {
    if regime == ExecutionRegime::Stateless {
        info!("Stateless regime, no backing store connection will be created");
        return Arc::new(UnavailableStore::new("stateless execution regime"));
    }

    if !config.enabled {
        info!("Backing store disabled by configuration");
        return Arc::new(UnavailableStore::new("backing store disabled"));
    }

    match config.backend.as_str() {
        // Same wire protocol
        "redis" | "dragonfly" | "valkey" => create_redis_store(config).await,
        "local" | "memory" => {
            info!(backend = "local", "In-process backing store initialized");
            Arc::new(LocalStore::with_clock(clock))
        }
        "none" => Arc::new(UnavailableStore::new("backing store set to none")),
        other => {
            warn!(
                backend = other,
                "Unknown backing store backend, falling back to unavailable store"
            );
            Arc::new(UnavailableStore::new(format!("unknown backend '{other}'")))
        }
    }
}

#[cfg(feature = "store-redis")]
async fn create_redis_store(config: &StoreConfig) -> Arc<dyn BackingStore> {
    let store = match RedisStore::from_config(config) {
        Ok(store) => store,
        Err(e) => {
            warn!(
                error = %e,
                "Failed to create Redis client, falling back to unavailable store (graceful degradation)"
            );
            return Arc::new(UnavailableStore::new(e.to_string()));
        }
    };

    match store.connect().await {
        Ok(()) => info!(
            backend = %config.backend,
            url = %store.redacted_url(),
            "Backing store provider initialized successfully"
        ),
        Err(e) => warn!(
            backend = %config.backend,
            url = %store.redacted_url(),
            error = %e,
            "Initial backing store connect failed, starting degraded"
        ),
    }

    Arc::new(store)
}

#[cfg(not(feature = "store-redis"))]
async fn create_redis_store(config: &StoreConfig) -> Arc<dyn BackingStore> {
    warn!(
        backend = %config.backend,
        "Redis backend requested but store-redis feature is not enabled, falling back to unavailable store"
    );
    Arc::new(UnavailableStore::new("store-redis feature not enabled"))
}
