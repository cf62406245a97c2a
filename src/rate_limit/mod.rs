//! # Fixed-Window Rate Limiting
//!
//! Counters live in the backing store (`INCR`, `PEXPIRE` on the first hit,
//! `PTTL` for the reset time) so every process shares one budget. When the
//! store is down, or any step fails, the same semantics run against an
//! in-process window map; counts are then per process until the store
//! recovers. A check never fails: callers only ever get a decision.

pub mod budgets;

pub use budgets::{RateLimitBudget, RouteBudgets, RouteClass};

use crate::clock::{duration_to_ms, SharedClock, SystemClock};
use crate::config::RateLimitConfig;
use crate::error::{ResilienceError, Result};
use crate::logging::{log_memory_fallback, log_rate_limit_rejection};
use crate::store::{BackingStore, StoreResult, PTTL_NO_EXPIRY};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub limited: bool,
    pub limit: u64,
    /// Requests counted in the current window, this one included
    pub count: u64,
    pub remaining: u64,
    pub reset_at_epoch_ms: i64,
    pub decided_at_epoch_ms: i64,
}

impl RateLimitDecision {
    fn new(count: u64, limit: u64, reset_at_epoch_ms: i64, now: i64) -> Self {
        Self {
            limited: count > limit,
            limit,
            count,
            remaining: limit.saturating_sub(count),
            reset_at_epoch_ms,
            decided_at_epoch_ms: now,
        }
    }

    /// Seconds until the window resets, rounded up; at least 1 when limited
    pub fn retry_after(&self) -> u64 {
        let remaining_ms = self
            .reset_at_epoch_ms
            .saturating_sub(self.decided_at_epoch_ms)
            .max(0) as u64;
        let seconds = remaining_ms.div_ceil(1_000);
        if self.limited {
            seconds.max(1)
        } else {
            seconds
        }
    }

    /// `Err(RateLimited)` when this decision rejects the request
    pub fn ensure_allowed(self) -> Result<Self> {
        if self.limited {
            Err(ResilienceError::RateLimited {
                retry_after: self.retry_after(),
            })
        } else {
            Ok(self)
        }
    }
}

/// In-process counter for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u64,
    pub window_reset_at_epoch_ms: i64,
}

#[derive(Debug)]
pub struct RateLimiter {
    store: Arc<dyn BackingStore>,
    windows: DashMap<String, RateWindow>,
    clock: SharedClock,
    key_prefix: String,
    budgets: RouteBudgets,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn BackingStore>, clock: SharedClock) -> Self {
        Self::from_config(&RateLimitConfig::default(), store, clock)
    }

    pub fn from_config(
        config: &RateLimitConfig,
        store: Arc<dyn BackingStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            windows: DashMap::new(),
            clock,
            key_prefix: config.key_prefix.clone(),
            budgets: RouteBudgets::from_config(config),
        }
    }

    /// Memory-only limiter on the system clock
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::store::UnavailableStore::new("memory-only rate limiter")),
            SystemClock::shared(),
        )
    }

    pub fn budgets(&self) -> &RouteBudgets {
        &self.budgets
    }

    /// Count one request against `key` and decide
    pub async fn check(&self, key: &str, limit: u64, window: Duration) -> RateLimitDecision {
        let key = format!("{}{}", self.key_prefix, key);
        let now = self.clock.now_epoch_ms();

        let decision = if self.store.is_alive() {
            match self.check_store(&key, limit, window, now).await {
                Ok(decision) => decision,
                Err(e) => {
                    log_memory_fallback(&key, "rate_limit", &e.to_string());
                    self.check_memory(&key, limit, window, now)
                }
            }
        } else {
            self.check_memory(&key, limit, window, now)
        };

        if decision.limited {
            log_rate_limit_rejection(
                &key,
                decision.count,
                decision.limit,
                decision.reset_at_epoch_ms,
            );
        }
        decision
    }

    /// Check `identity` against the budget configured for `path`
    pub async fn check_route(&self, identity: &str, path: &str) -> RateLimitDecision {
        let (_, budget) = self.budgets.resolve(path);
        self.check(&format!("{identity}:{path}"), budget.limit, budget.window())
            .await
    }

    /// Remove windows that have already reset, returning how many were removed
    pub fn purge_expired_windows(&self) -> usize {
        let now = self.clock.now_epoch_ms();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now < window.window_reset_at_epoch_ms);
        before.saturating_sub(self.windows.len())
    }

    /// Number of in-process windows currently tracked
    pub fn memory_window_count(&self) -> usize {
        self.windows.len()
    }

    async fn check_store(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        now: i64,
    ) -> StoreResult<RateLimitDecision> {
        let window_ms = duration_to_ms(window);

        let count = self.store.incr(key).await?;
        if count == 1 {
            self.store.pexpire(key, window).await?;
        }

        let mut ttl_ms = self.store.pttl(key).await?;
        if ttl_ms == PTTL_NO_EXPIRY {
            // Counter survived without an expiry (e.g. a crash between INCR and PEXPIRE)
            self.store.pexpire(key, window).await?;
            ttl_ms = window_ms;
        } else if ttl_ms < 0 {
            ttl_ms = window_ms;
        }

        Ok(RateLimitDecision::new(
            count.max(0) as u64,
            limit,
            now.saturating_add(ttl_ms),
            now,
        ))
    }

    fn check_memory(&self, key: &str, limit: u64, window: Duration, now: i64) -> RateLimitDecision {
        let window_ms = duration_to_ms(window);
        let (count, reset_at) = {
            let mut entry = self
                .windows
                .entry(key.to_string())
                .or_insert_with(|| RateWindow {
                    count: 0,
                    window_reset_at_epoch_ms: now.saturating_add(window_ms),
                });
            if now >= entry.window_reset_at_epoch_ms {
                entry.count = 0;
                entry.window_reset_at_epoch_ms = now.saturating_add(window_ms);
            }
            entry.count += 1;
            (entry.count, entry.window_reset_at_epoch_ms)
        };
        RateLimitDecision::new(count, limit, reset_at, now)
    }
}
