//! # Resilience Module
//!
//! Fault tolerance for calls to external services and the backing store.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: isolate failing components, test recovery with bounded trials
//! - **Registry**: named breakers created lazily with per-component policies
//! - **Retry**: exponential backoff with jitter for transient, coded errors
//! - **Metrics**: per-breaker counters and a registry-wide health score
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::resilience::CircuitBreakerRegistry;
//!
//! # async fn example() {
//! let breakers = CircuitBreakerRegistry::with_defaults();
//!
//! let summary = breakers
//!     .fire_or_else(
//!         "content-analysis",
//!         || async { Ok::<_, std::io::Error>("fresh analysis".to_string()) },
//!         |_| "analysis unavailable".to_string(),
//!     )
//!     .await;
//! # let _ = summary;
//! # }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod metrics;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    BreakerPolicy, CircuitBreaker, CircuitBreakerError, CircuitBreakerSnapshot, CircuitState,
    RejectionReason,
};
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use registry::CircuitBreakerRegistry;
pub use retry::{with_retry, ErrorCode, RetryPolicy};
