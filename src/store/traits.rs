//! Backing store trait definition

use super::errors::StoreResult;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// PTTL reply for a key that does not exist
pub const PTTL_MISSING: i64 = -2;

/// PTTL reply for a key that exists without an expiry
pub const PTTL_NO_EXPIRY: i64 = -1;

/// Shared, network-accessible key/value store with TTL and atomic increment
///
/// Implemented by `RedisStore` (network), `LocalStore` (in-process) and
/// `UnavailableStore` (never alive). Values are opaque text; callers own the
/// serialization.
#[async_trait]
pub trait BackingStore: Send + Sync + Debug {
    /// Last known liveness of the underlying transport.
    ///
    /// Maintained from connection events and command outcomes, never polled per call
    /// per call.
    fn is_alive(&self) -> bool;

    /// GET: `Ok(Some(value))` on hit, `Ok(None)` on miss
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// SET with a millisecond expiry
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// DEL (idempotent)
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// INCR: atomically increment and return the post-increment value
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// PEXPIRE: returns `false` when the key does not exist
    async fn pexpire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// PTTL: remaining milliseconds, [`PTTL_NO_EXPIRY`] or [`PTTL_MISSING`]
    async fn pttl(&self, key: &str) -> StoreResult<i64>;

    /// PING
    async fn health_check(&self) -> StoreResult<bool>;

    fn provider_name(&self) -> &'static str;

    /// Whether state is shared across processes
    fn is_distributed(&self) -> bool;

    /// Start the background reconnect loop, if this provider has one
    fn spawn_reconnect_task(self: Arc<Self>) -> Option<JoinHandle<()>> {
        None
    }
}
