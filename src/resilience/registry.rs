//! # Circuit Breaker Registry
//!
//! Named breakers created lazily on first use. The policy for a name comes
//! from configuration when the breaker is created and stays fixed for its
//! lifetime. A fresh registry starts Closed for every name.

use crate::clock::{SharedClock, SystemClock};
use crate::config::CircuitBreakerConfig;
use crate::resilience::{
    BreakerPolicy, CircuitBreaker, CircuitBreakerError, CircuitBreakerMetrics,
    CircuitBreakerSnapshot, CircuitState, SystemCircuitBreakerMetrics,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of circuit breakers keyed by guarded operation name
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    config: CircuitBreakerConfig,
    clock: SharedClock,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        info!(
            default_failure_threshold = config.default_config.failure_threshold,
            component_overrides = config.component_configs.len(),
            "Initializing circuit breaker registry"
        );
        Self {
            breakers: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Registry with default policies on the system clock
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default(), SystemClock::shared())
    }

    /// Get or create the breaker for `name` using its configured policy
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }
        let policy = self.config.config_for_component(name).to_policy();
        self.insert_if_absent(name, policy)
    }

    /// Get or create the breaker for `name`, using `policy` if it is new
    ///
    /// An existing breaker keeps the policy it was created with.
    pub fn get_or_create_with(&self, name: &str, policy: BreakerPolicy) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }
        self.insert_if_absent(name, policy)
    }

    fn insert_if_absent(&self, name: &str, policy: BreakerPolicy) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.write();

        // Double-check: another caller may have created it
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }

        let breaker = Arc::new(CircuitBreaker::with_clock(
            name,
            policy,
            Arc::clone(&self.clock),
        ));
        breakers.insert(name.to_string(), Arc::clone(&breaker));

        info!(
            component = name,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Run `operation` through the breaker named `name`
    pub async fn fire<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let breaker = self.get_or_create(name);
        breaker.call(operation).await
    }

    /// Run `operation` through the breaker named `name`, falling back on rejection
    pub async fn fire_or_else<T, E, F, Fut, FB>(&self, name: &str, operation: F, fallback: FB) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce(CircuitBreakerError) -> T,
    {
        let breaker = self.get_or_create(name);
        breaker.call_or_else(operation, fallback).await
    }

    /// Current state; names never used report Closed
    pub fn state(&self, name: &str) -> CircuitState {
        self.breakers
            .read()
            .get(name)
            .map_or(CircuitState::Closed, |breaker| breaker.state())
    }

    /// Return `name` to a fresh Closed state; returns false for unknown names
    pub fn reset(&self, name: &str) -> bool {
        let breaker = self.breakers.read().get(name).cloned();
        match breaker {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every breaker (emergency recovery)
    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }

    pub fn snapshot(&self, name: &str) -> Option<CircuitBreakerSnapshot> {
        let breaker = self.breakers.read().get(name).cloned();
        breaker.map(|breaker| breaker.snapshot())
    }

    pub fn component_metrics(&self, name: &str) -> Option<CircuitBreakerMetrics> {
        let breaker = self.breakers.read().get(name).cloned();
        breaker.map(|breaker| breaker.metrics())
    }

    /// Names of every breaker created so far, sorted
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Registry-wide metrics
    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        let mut system_metrics = SystemCircuitBreakerMetrics::new(self.clock.now_epoch_ms());
        for breaker in breakers {
            system_metrics.add_circuit_breaker(breaker.name().to_string(), breaker.metrics());
        }
        system_metrics
    }

    /// Fraction of healthy breakers (0.0 to 1.0)
    pub fn system_health_score(&self) -> f64 {
        self.system_metrics().health_score()
    }

    /// Collect system metrics and log a health summary
    ///
    /// Each unhealthy breaker gets its own warning. Nothing is logged while
    /// the registry is empty.
    pub fn report_health(&self) -> SystemCircuitBreakerMetrics {
        let system_metrics = self.system_metrics();
        if system_metrics.circuit_breakers.is_empty() {
            return system_metrics;
        }

        info!(
            breakers = system_metrics.circuit_breakers.len(),
            total_calls = system_metrics.total_calls(),
            total_failures = system_metrics.total_failures(),
            "{}",
            system_metrics.format_summary()
        );
        for (name, metrics) in system_metrics.unhealthy_circuits() {
            warn!(
                component = %name,
                state = %metrics.current_state,
                "{}",
                metrics.format_summary()
            );
        }
        system_metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CircuitBreakerComponentConfig;
    use std::time::Duration;

    fn registry() -> (CircuitBreakerRegistry, Arc<ManualClock>) {
        let mut config = CircuitBreakerConfig::default();
        config.component_configs.insert(
            "content-analysis".to_string(),
            CircuitBreakerComponentConfig {
                failure_threshold: 1,
                ..CircuitBreakerComponentConfig::default()
            },
        );
        let clock = ManualClock::new(0);
        (CircuitBreakerRegistry::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let (registry, _clock) = registry();
        let first = registry.get_or_create("content-analysis");
        let second = registry.get_or_create("content-analysis");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.policy().failure_threshold, 1);

        let other = registry.get_or_create("unconfigured");
        assert_eq!(other.policy(), &BreakerPolicy::default());
        assert_eq!(
            registry.list_components(),
            vec!["content-analysis".to_string(), "unconfigured".to_string()]
        );
    }

    #[test]
    fn test_policy_fixed_at_creation() {
        let (registry, _clock) = registry();
        let created = registry.get_or_create_with("custom", BreakerPolicy::aggressive());
        let again = registry.get_or_create_with("custom", BreakerPolicy::default());
        assert!(Arc::ptr_eq(&created, &again));
        assert_eq!(again.policy(), &BreakerPolicy::aggressive());
    }

    #[tokio::test]
    async fn test_fire_uses_component_policy() {
        let (registry, _clock) = registry();

        let result = registry
            .fire("content-analysis", || async { Err::<(), _>("503") })
            .await;
        assert!(result.is_err());
        assert_eq!(registry.state("content-analysis"), CircuitState::Open);

        let value = registry
            .fire_or_else(
                "content-analysis",
                || async { Ok::<_, String>(vec!["fresh"]) },
                |_| vec![],
            )
            .await;
        assert!(value.is_empty());
    }

    #[tokio::test]
    async fn test_state_and_reset_for_unknown_names() {
        let (registry, _clock) = registry();
        assert_eq!(registry.state("never-used"), CircuitState::Closed);
        assert!(!registry.reset("never-used"));
        assert!(registry.snapshot("never-used").is_none());
        assert!(registry.list_components().is_empty());
    }

    #[tokio::test]
    async fn test_system_metrics() {
        let (registry, clock) = registry();
        clock.advance(Duration::from_secs(5));

        let _ = registry
            .fire("content-analysis", || async { Err::<(), _>("down") })
            .await;
        let _ = registry
            .fire("external-generation-api", || async { Ok::<_, String>(1) })
            .await;

        let metrics = registry.system_metrics();
        assert_eq!(metrics.collected_at_epoch_ms, 5_000);
        assert_eq!(metrics.circuit_breakers.len(), 2);
        assert_eq!(metrics.count_by_state().get(&CircuitState::Open), Some(&1));
        assert!((registry.system_health_score() - 0.5).abs() < f64::EPSILON);

        assert!(registry.reset("content-analysis"));
        assert_eq!(registry.state("content-analysis"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_report_health_lists_unhealthy_breakers() {
        let (registry, _clock) = registry();
        assert!(registry.report_health().circuit_breakers.is_empty());

        let _ = registry
            .fire("content-analysis", || async { Err::<(), _>("down") })
            .await;
        for _ in 0..3 {
            let _ = registry
                .fire("external-generation-api", || async { Ok::<_, String>(1) })
                .await;
        }

        let report = registry.report_health();
        assert_eq!(report.total_calls(), 4);
        assert_eq!(report.total_failures(), 1);
        assert!((report.system_failure_rate() - 0.25).abs() < f64::EPSILON);

        let unhealthy = report.unhealthy_circuits();
        assert_eq!(unhealthy.len(), 1);
        assert_eq!(unhealthy[0].0, "content-analysis");
        assert!(unhealthy[0].1.format_summary().starts_with("State: Failing"));
        assert!(report.format_summary().contains("1 open"));
    }
}
