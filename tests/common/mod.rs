//! Shared helpers for integration tests
#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use parking_lot::Mutex;
use resilience_core::clock::{ManualClock, SharedClock};
use resilience_core::store::{BackingStore, LocalStore, StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// `LocalStore` with injectable faults
///
/// `fail_next(n, code)` makes the next `n` commands fail with a connection
/// error carrying `code`; `mark_down` / `mark_alive` flip liveness.
/// `report_down` only clears the liveness flag while commands keep working,
/// like a store whose flag has not caught up with a recovered connection.
#[derive(Debug)]
pub struct FlakyStore {
    inner: LocalStore,
    pending_failures: Mutex<Option<(usize, String)>>,
    commands: AtomicUsize,
    reported_down: AtomicBool,
}

impl FlakyStore {
    pub fn new(clock: SharedClock) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalStore::with_clock(clock),
            pending_failures: Mutex::new(None),
            commands: AtomicUsize::new(0),
            reported_down: AtomicBool::new(false),
        })
    }

    pub fn fail_next(&self, count: usize, code: &str) {
        *self.pending_failures.lock() = Some((count, code.to_string()));
    }

    pub fn mark_down(&self) {
        self.inner.mark_down();
    }

    pub fn mark_alive(&self) {
        self.inner.mark_alive();
        self.reported_down.store(false, Ordering::SeqCst);
    }

    pub fn report_down(&self) {
        self.reported_down.store(true, Ordering::SeqCst);
    }

    /// Commands received, failed ones included
    pub fn command_count(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &LocalStore {
        &self.inner
    }

    fn injected(&self, command: &str) -> StoreResult<()> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        let mut pending = self.pending_failures.lock();
        match pending.as_mut() {
            Some((remaining, code)) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::connection(
                    code,
                    format!("injected failure for {command}"),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl BackingStore for FlakyStore {
    fn is_alive(&self) -> bool {
        !self.reported_down.load(Ordering::SeqCst) && self.inner.is_alive()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.injected("GET")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.injected("SET")?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.injected("DEL")?;
        self.inner.delete(key).await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.injected("INCR")?;
        self.inner.incr(key).await
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.injected("PEXPIRE")?;
        self.inner.pexpire(key, ttl).await
    }

    async fn pttl(&self, key: &str) -> StoreResult<i64> {
        self.injected("PTTL")?;
        self.inner.pttl(key).await
    }

    async fn health_check(&self) -> StoreResult<bool> {
        self.inner.health_check().await
    }

    fn provider_name(&self) -> &'static str {
        "flaky"
    }

    fn is_distributed(&self) -> bool {
        true
    }
}

/// Manual clock starting at a fixed, non-zero epoch
pub fn test_clock() -> Arc<ManualClock> {
    ManualClock::new(1_700_000_000_000)
}

/// Install a test subscriber once; later calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
