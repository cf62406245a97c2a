//! # Circuit Breaker Implementation
//!
//! Fault isolation for calls to slow or unreliable services. Three states:
//! Closed (normal operation), Open (failing fast) and HalfOpen (probing
//! recovery with a bounded number of trial calls).
//!
//! Cooldowns are measured on the injected [`Clock`](crate::clock::Clock) from
//! the time of the last failure. Each admitted call carries the state
//! generation it was admitted under; an outcome from an older generation
//! updates the counters but never moves the breaker.

use crate::clock::{duration_to_ms, SharedClock, SystemClock};
use crate::logging::log_circuit_transition;
use crate::resilience::CircuitBreakerMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(label)
    }
}

/// Why a guarded call did not produce a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Open and still cooling down
    CircuitOpen,
    /// HalfOpen with every trial slot taken
    TrialsSaturated,
    /// The operation returned an error
    OperationFailed,
    /// The operation exceeded the call timeout
    TimedOut,
}

/// Errors returned to callers of a guarded operation
///
/// The upstream error is logged and swallowed; callers only learn that the
/// component is unavailable and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("Service unavailable: {component} ({reason:?})")]
    Unavailable {
        component: String,
        reason: RejectionReason,
    },
}

impl CircuitBreakerError {
    pub fn component(&self) -> &str {
        match self {
            Self::Unavailable { component, .. } => component,
        }
    }

    pub fn reason(&self) -> RejectionReason {
        match self {
            Self::Unavailable { reason, .. } => *reason,
        }
    }

    /// Whether the operation was never invoked
    pub fn is_short_circuit(&self) -> bool {
        matches!(
            self.reason(),
            RejectionReason::CircuitOpen | RejectionReason::TrialsSaturated
        )
    }
}

/// Thresholds fixed for a breaker at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerPolicy {
    /// Consecutive failures that open a closed circuit
    pub failure_threshold: u32,
    /// Cooldown after the last failure before a trial call is admitted
    pub reset_timeout: Duration,
    /// Trial successes that close a half-open circuit; also the trial concurrency
    pub half_open_success_threshold: u32,
    /// Deadline for each admitted call
    pub call_timeout: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_millis(60_000),
            half_open_success_threshold: 2,
            call_timeout: Duration::from_millis(10_000),
        }
    }
}

impl BreakerPolicy {
    /// Fast-tripping policy for tests and latency-sensitive components
    pub fn aggressive() -> Self {
        Self {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(1_000),
            half_open_success_threshold: 1,
            call_timeout: Duration::from_millis(1_000),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }
        if self.half_open_success_threshold == 0 {
            return Err("half_open_success_threshold must be greater than 0".to_string());
        }
        if self.reset_timeout.is_zero() {
            return Err("reset_timeout must be greater than 0".to_string());
        }
        if self.call_timeout.is_zero() {
            return Err("call_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub generation: u64,
    pub consecutive_failures: u32,
    pub last_failure_at_epoch_ms: Option<i64>,
    pub half_open_successes: u32,
    pub half_open_in_flight: u32,
    pub metrics: CircuitBreakerMetrics,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    consecutive_failures: u32,
    last_failure_at_epoch_ms: Option<i64>,
    half_open_successes: u32,
    half_open_in_flight: u32,
    metrics: CircuitBreakerMetrics,
}

impl BreakerState {
    fn fresh() -> Self {
        Self {
            state: CircuitState::Closed,
            generation: 0,
            consecutive_failures: 0,
            last_failure_at_epoch_ms: None,
            half_open_successes: 0,
            half_open_in_flight: 0,
            metrics: CircuitBreakerMetrics::new(),
        }
    }

    /// Move to `to`, starting a new generation
    fn transition(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        self.state = to;
        self.generation += 1;
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
        if to == CircuitState::Closed {
            self.consecutive_failures = 0;
        }
        Transition {
            from,
            to,
            consecutive_failures: self.consecutive_failures,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Clone, Copy)]
struct Permit {
    generation: u64,
    admitted_in: CircuitState,
}

/// Admitted call; releases its half-open trial slot if dropped unfinished
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    permit: Permit,
    finished: bool,
}

impl Admission<'_> {
    fn finish(mut self, outcome: Outcome, duration: Duration) {
        self.finished = true;
        self.breaker.record(self.permit, outcome, duration);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.abandon(self.permit);
        }
    }
}

/// Circuit breaker guarding one named operation
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    policy: BreakerPolicy,
    clock: SharedClock,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and policy
    pub fn new(name: impl Into<String>, policy: BreakerPolicy) -> Self {
        Self::with_clock(name, policy, SystemClock::shared())
    }

    pub fn with_clock(name: impl Into<String>, policy: BreakerPolicy, clock: SharedClock) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            failure_threshold = policy.failure_threshold,
            reset_timeout_ms = duration_to_ms(policy.reset_timeout),
            half_open_success_threshold = policy.half_open_success_threshold,
            call_timeout_ms = duration_to_ms(policy.call_timeout),
            "Circuit breaker initialized"
        );

        Self {
            name,
            policy,
            clock,
            inner: Mutex::new(BreakerState::fresh()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let admission = self.admit()?;

        let started = Instant::now();
        let result = tokio::time::timeout(self.policy.call_timeout, operation()).await;
        let duration = started.elapsed();

        match result {
            Ok(Ok(value)) => {
                admission.finish(Outcome::Success, duration);
                Ok(value)
            }
            Ok(Err(e)) => {
                error!(
                    component = %self.name,
                    duration_ms = duration_to_ms(duration),
                    error = %e,
                    "Guarded operation failed"
                );
                admission.finish(Outcome::Failure, duration);
                Err(self.unavailable(RejectionReason::OperationFailed))
            }
            Err(_) => {
                warn!(
                    component = %self.name,
                    call_timeout_ms = duration_to_ms(self.policy.call_timeout),
                    "Guarded operation timed out"
                );
                admission.finish(Outcome::Timeout, duration);
                Err(self.unavailable(RejectionReason::TimedOut))
            }
        }
    }

    /// Execute an operation, substituting `fallback` for any rejection
    pub async fn call_or_else<T, E, F, Fut, FB>(&self, operation: F, fallback: FB) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce(CircuitBreakerError) -> T,
    {
        match self.call(operation).await {
            Ok(value) => value,
            Err(rejection) => {
                debug!(
                    component = %self.name,
                    reason = ?rejection.reason(),
                    "Serving fallback"
                );
                fallback(rejection)
            }
        }
    }

    /// Return to a fresh Closed state
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.last_failure_at_epoch_ms = None;
            inner.transition(CircuitState::Closed)
        };
        warn!(component = %self.name, "Circuit breaker reset");
        self.log_transition(transition, "administrative reset");
    }

    /// Force circuit to open state (emergency stop)
    pub fn force_open(&self) {
        let now = self.clock.now_epoch_ms();
        let transition = {
            let mut inner = self.inner.lock();
            inner.last_failure_at_epoch_ms = Some(now);
            inner.transition(CircuitState::Open)
        };
        warn!(component = %self.name, "Circuit breaker forced open");
        self.log_transition(transition, "forced open");
    }

    /// Current metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        inner.metrics.clone().with_derived(inner.state)
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            generation: inner.generation,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at_epoch_ms: inner.last_failure_at_epoch_ms,
            half_open_successes: inner.half_open_successes,
            half_open_in_flight: inner.half_open_in_flight,
            metrics: inner.metrics.clone().with_derived(inner.state),
        }
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        let metrics = self.metrics();
        if metrics.current_state != CircuitState::Closed {
            return false;
        }
        // Too few calls to judge
        metrics.total_calls < 10 || metrics.is_healthy()
    }

    fn unavailable(&self, reason: RejectionReason) -> CircuitBreakerError {
        CircuitBreakerError::Unavailable {
            component: self.name.clone(),
            reason,
        }
    }

    /// Decide admission, performing the Open -> HalfOpen move when due
    fn admit(&self) -> Result<Admission<'_>, CircuitBreakerError> {
        let now = self.clock.now_epoch_ms();
        let mut transition = None;

        let decision = {
            let mut inner = self.inner.lock();

            if inner.state == CircuitState::Open {
                let cooled_down = inner.last_failure_at_epoch_ms.map_or(true, |at| {
                    now.saturating_sub(at) >= duration_to_ms(self.policy.reset_timeout)
                });
                if cooled_down {
                    transition = Some(inner.transition(CircuitState::HalfOpen));
                }
            }

            match inner.state {
                CircuitState::Closed => Ok(Permit {
                    generation: inner.generation,
                    admitted_in: CircuitState::Closed,
                }),
                CircuitState::HalfOpen
                    if inner.half_open_in_flight < self.policy.half_open_success_threshold =>
                {
                    inner.half_open_in_flight += 1;
                    Ok(Permit {
                        generation: inner.generation,
                        admitted_in: CircuitState::HalfOpen,
                    })
                }
                CircuitState::HalfOpen => {
                    inner.metrics.short_circuit_count += 1;
                    Err(RejectionReason::TrialsSaturated)
                }
                CircuitState::Open => {
                    inner.metrics.short_circuit_count += 1;
                    Err(RejectionReason::CircuitOpen)
                }
            }
        };

        if let Some(transition) = transition {
            self.log_transition(transition, "reset timeout elapsed");
        }

        match decision {
            Ok(permit) => Ok(Admission {
                breaker: self,
                permit,
                finished: false,
            }),
            Err(reason) => {
                debug!(component = %self.name, reason = ?reason, "Call short-circuited");
                Err(self.unavailable(reason))
            }
        }
    }

    fn record(&self, permit: Permit, outcome: Outcome, duration: Duration) {
        let now = self.clock.now_epoch_ms();
        let mut transition = None;

        {
            let mut inner = self.inner.lock();
            inner.metrics.total_calls += 1;
            inner.metrics.total_duration += duration;
            match outcome {
                Outcome::Success => {
                    inner.metrics.success_count += 1;
                    inner.metrics.success_duration += duration;
                }
                Outcome::Failure => inner.metrics.failure_count += 1,
                Outcome::Timeout => {
                    inner.metrics.failure_count += 1;
                    inner.metrics.timeout_count += 1;
                }
            }

            if permit.generation != inner.generation {
                inner.metrics.stale_outcome_count += 1;
                debug!(
                    component = %self.name,
                    admitted_in = %permit.admitted_in,
                    current_state = %inner.state,
                    "Outcome from an earlier generation ignored for state"
                );
                return;
            }

            match (inner.state, outcome) {
                (CircuitState::Closed, Outcome::Success) => {
                    inner.consecutive_failures = 0;
                }
                (CircuitState::Closed, _) => {
                    inner.consecutive_failures += 1;
                    inner.last_failure_at_epoch_ms = Some(now);
                    if inner.consecutive_failures >= self.policy.failure_threshold {
                        transition = Some(inner.transition(CircuitState::Open));
                    }
                }
                (CircuitState::HalfOpen, Outcome::Success) => {
                    inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.policy.half_open_success_threshold {
                        transition = Some(inner.transition(CircuitState::Closed));
                    }
                }
                (CircuitState::HalfOpen, _) => {
                    inner.consecutive_failures += 1;
                    inner.last_failure_at_epoch_ms = Some(now);
                    transition = Some(inner.transition(CircuitState::Open));
                }
                // Every move into Open bumps the generation
                (CircuitState::Open, _) => {}
            }
        }

        if let Some(transition) = transition {
            let reason = match transition.to {
                CircuitState::Open => "failure threshold reached",
                CircuitState::Closed => "trial successes reached",
                CircuitState::HalfOpen => "reset timeout elapsed",
            };
            self.log_transition(transition, reason);
        }
    }

    /// Release a trial slot held by a call whose future was dropped
    fn abandon(&self, permit: Permit) {
        let mut inner = self.inner.lock();
        if permit.generation == inner.generation && permit.admitted_in == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    fn log_transition(&self, transition: Transition, reason: &str) {
        log_circuit_transition(
            &self.name,
            transition.from,
            transition.to,
            transition.consecutive_failures,
            reason,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn policy(failure_threshold: u32, half_open_success_threshold: u32) -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold,
            reset_timeout: Duration::from_millis(60_000),
            half_open_success_threshold,
            call_timeout: Duration::from_millis(500),
        }
    }

    fn breaker(policy: BreakerPolicy) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = ManualClock::new(1_000_000);
        (
            CircuitBreaker::with_clock("test", policy, clock.clone()),
            clock,
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError> {
        cb.call(|| async { Err::<(), _>("upstream 500") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<&'static str, CircuitBreakerError> {
        cb.call(|| async { Ok::<_, String>("ok") }).await
    }

    #[tokio::test]
    async fn test_circuit_breaker_normal_operation() {
        let (circuit, _clock) = breaker(policy(3, 2));
        assert_eq!(circuit.state(), CircuitState::Closed);

        assert_eq!(succeed(&circuit).await, Ok("ok"));

        let metrics = circuit.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let (circuit, _clock) = breaker(policy(3, 2));
        let _ = fail(&circuit).await;
        let _ = fail(&circuit).await;
        let _ = succeed(&circuit).await;
        let _ = fail(&circuit).await;
        let _ = fail(&circuit).await;

        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.snapshot().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_on_failures() {
        let (circuit, _clock) = breaker(policy(2, 2));

        let err = fail(&circuit).await.unwrap_err();
        assert_eq!(err.reason(), RejectionReason::OperationFailed);
        assert_eq!(circuit.state(), CircuitState::Closed);

        let _ = fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let invoked = std::sync::atomic::AtomicBool::new(false);
        let result = circuit
            .call(|| async {
                invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, String>("should not execute")
            })
            .await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::Unavailable {
                reason: RejectionReason::CircuitOpen,
                ..
            })
        ));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(circuit.metrics().short_circuit_count, 1);
    }

    #[tokio::test]
    async fn test_half_open_recovery() {
        let (circuit, clock) = breaker(policy(1, 2));
        let _ = fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        clock.advance(Duration::from_millis(59_999));
        assert!(fail(&circuit).await.unwrap_err().is_short_circuit());

        clock.advance(Duration::from_millis(1));
        assert!(succeed(&circuit).await.is_ok());
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        assert!(succeed(&circuit).await.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.snapshot().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let (circuit, clock) = breaker(policy(1, 2));
        let _ = fail(&circuit).await;

        clock.advance(Duration::from_secs(60));
        let _ = fail(&circuit).await;

        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.last_failure_at_epoch_ms, Some(1_060_000));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let (circuit, _clock) = breaker(BreakerPolicy {
            call_timeout: Duration::from_millis(20),
            ..policy(1, 1)
        });

        let result = circuit
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, String>("late")
            })
            .await;

        assert_eq!(result.unwrap_err().reason(), RejectionReason::TimedOut);
        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(circuit.metrics().timeout_count, 1);
    }

    #[tokio::test]
    async fn test_reset_and_force_open() {
        let (circuit, _clock) = breaker(policy(5, 1));

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(succeed(&circuit).await.is_err());

        circuit.reset();
        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.last_failure_at_epoch_ms, None);
        assert!(succeed(&circuit).await.is_ok());
    }

    #[tokio::test]
    async fn test_fallback_is_served_on_rejection() {
        let (circuit, _clock) = breaker(policy(1, 1));

        let value = circuit
            .call_or_else(|| async { Err::<&str, _>("boom") }, |_| "cached")
            .await;
        assert_eq!(value, "cached");

        let value = circuit
            .call_or_else(
                || async { Ok::<_, String>("fresh") },
                |rejection| {
                    assert!(rejection.is_short_circuit());
                    "cached"
                },
            )
            .await;
        assert_eq!(value, "cached");
    }

    #[test]
    fn test_policy_defaults_and_validation() {
        let policy = BreakerPolicy::default();
        assert_eq!(policy.failure_threshold, 3);
        assert_eq!(policy.reset_timeout, Duration::from_millis(60_000));
        assert_eq!(policy.half_open_success_threshold, 2);
        assert_eq!(policy.call_timeout, Duration::from_millis(10_000));
        assert!(policy.validate().is_ok());

        let invalid = BreakerPolicy {
            failure_threshold: 0,
            ..BreakerPolicy::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[tokio::test]
    async fn test_average_duration_counts_only_successes() {
        let (cb, _clock) = breaker(BreakerPolicy {
            call_timeout: Duration::from_millis(50),
            ..policy(5, 1)
        });

        succeed(&cb).await.unwrap();
        let timed_out = cb
            .call(|| std::future::pending::<Result<(), String>>())
            .await;
        assert_eq!(timed_out.unwrap_err().reason(), RejectionReason::TimedOut);

        let metrics = cb.metrics();
        assert!(metrics.total_duration >= Duration::from_millis(50));
        assert_eq!(metrics.average_duration, metrics.success_duration);
        assert!(metrics.average_duration < Duration::from_millis(50));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }
}
