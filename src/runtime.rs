//! # Resilience Core
//!
//! Composition root. Builds every component once from configuration and
//! owns the background tasks of the long-lived regime: the store reconnect
//! loop and the memory sweeper. Callers hold one `ResilienceCore` (or clone
//! the `Arc`s it exposes) instead of reaching for module-level singletons.
//!
//! In the stateless regime no store connection is created and no background
//! task is spawned; every component runs on its memory tier.

use crate::cache::{CacheFacade, MemoryFallbackCache};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{ConfigManager, ExecutionRegime, ResilienceConfig};
use crate::error::Result;
use crate::rate_limit::RateLimiter;
use crate::resilience::CircuitBreakerRegistry;
use crate::store::{create_store, BackingStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug)]
pub struct ResilienceCore {
    regime: ExecutionRegime,
    config: ResilienceConfig,
    clock: SharedClock,
    store: Arc<dyn BackingStore>,
    memory: Arc<MemoryFallbackCache>,
    cache: Arc<CacheFacade>,
    breakers: Arc<CircuitBreakerRegistry>,
    rate_limiter: Arc<RateLimiter>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ResilienceCore {
    /// Load configuration from the environment and bootstrap
    pub async fn bootstrap() -> Result<Self> {
        let manager = ConfigManager::load()?;
        Self::from_config(manager.config().clone()).await
    }

    pub async fn from_config(config: ResilienceConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared()).await
    }

    /// Bootstrap with an explicit clock and the regime resolved from configuration
    pub async fn with_clock(config: ResilienceConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let regime = config.execution_mode.resolve();
        let store = create_store(&config.store, regime, Arc::clone(&clock)).await;
        Ok(Self::assemble(config, regime, store, clock))
    }

    /// Bootstrap around an already-built store (tests, custom providers)
    pub fn with_store(
        config: ResilienceConfig,
        regime: ExecutionRegime,
        store: Arc<dyn BackingStore>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, regime, store, clock))
    }

    fn assemble(
        config: ResilienceConfig,
        regime: ExecutionRegime,
        store: Arc<dyn BackingStore>,
        clock: SharedClock,
    ) -> Self {
        let memory = Arc::new(MemoryFallbackCache::new(
            config.cache.memory_max_entries,
            Arc::clone(&clock),
        ));
        let cache = Arc::new(CacheFacade::from_config(
            &config.cache,
            regime,
            Arc::clone(&store),
            Arc::clone(&memory),
            config.retry.to_policy(),
        ));
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breakers.clone(),
            Arc::clone(&clock),
        ));
        let rate_limiter = Arc::new(RateLimiter::from_config(
            &config.rate_limits,
            Arc::clone(&store),
            Arc::clone(&clock),
        ));

        let core = Self {
            regime,
            config,
            clock,
            store,
            memory,
            cache,
            breakers,
            rate_limiter,
            background_tasks: Mutex::new(Vec::new()),
        };

        if regime == ExecutionRegime::LongLived {
            core.spawn_background_tasks();
        }

        info!(
            regime = ?core.regime,
            store = core.store.provider_name(),
            store_alive = core.store.is_alive(),
            background_tasks = core.background_tasks.lock().len(),
            "Resilience core initialized"
        );
        core
    }

    fn spawn_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock();

        if let Some(handle) = Arc::clone(&self.store).spawn_reconnect_task() {
            tasks.push(handle);
        }

        let memory = Arc::clone(&self.memory);
        let rate_limiter = Arc::clone(&self.rate_limiter);
        let breakers = Arc::clone(&self.breakers);
        let interval = self.config.cache.sweep_interval();
        tasks.push(tokio::spawn(sweep_loop(
            memory,
            rate_limiter,
            breakers,
            interval,
        )));
    }

    pub fn regime(&self) -> ExecutionRegime {
        self.regime
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<CacheFacade> {
        &self.cache
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn background_task_count(&self) -> usize {
        self.background_tasks.lock().len()
    }

    /// Abort background tasks; components stay usable
    pub fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.background_tasks.lock().drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            task.abort();
        }
        if count > 0 {
            info!(aborted_tasks = count, "Resilience core background tasks stopped");
        }
    }
}

impl Drop for ResilienceCore {
    fn drop(&mut self) {
        for task in self.background_tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn sweep_loop(
    memory: Arc<MemoryFallbackCache>,
    rate_limiter: Arc<RateLimiter>,
    breakers: Arc<CircuitBreakerRegistry>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let entries = memory.purge_expired();
        let windows = rate_limiter.purge_expired_windows();
        if entries > 0 || windows > 0 {
            debug!(
                purged_entries = entries,
                purged_windows = windows,
                remaining_entries = memory.len(),
                "Memory sweep completed"
            );
        }
        breakers.report_health();
    }
}
