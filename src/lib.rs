#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Resilience Core
//!
//! Call protection, tiered caching and throttling primitives for a
//! multi-tenant content service, built to run both as a long-lived process
//! with a shared backing store and inside stateless, short-lived execution
//! contexts with no shared memory.
//!
//! ## Architecture
//!
//! Three independent entry points, composed explicitly by callers:
//!
//! 1. [`rate_limit::RateLimiter::check`] rejects over-budget requests early
//! 2. [`cache::CacheFacade::get_or_set`] serves reads from `[Network, Memory]` tiers
//! 3. [`resilience::CircuitBreakerRegistry::fire`] guards calls to external services
//!
//! [`resilience::with_retry`] wraps backing store calls that can fail transiently.
//!
//! ## Module Organization
//!
//! - [`clock`] - Wall-clock epoch-millisecond time source
//! - [`store`] - Backing store trait and providers (Redis, local, unavailable)
//! - [`cache`] - Tiered cache facade and memory fallback
//! - [`resilience`] - Circuit breakers, registry, retry and backoff
//! - [`rate_limit`] - Fixed-window rate limiter and route budgets
//! - [`config`] - Layered configuration
//! - [`runtime`] - Composition root and background tasks
//! - [`error`] - Crate-wide error type
//! - [`logging`] - Structured logging setup and event helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilience_core::ResilienceCore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! resilience_core::logging::init_structured_logging();
//! let core = ResilienceCore::bootstrap().await?;
//!
//! core.rate_limiter()
//!     .check_route("203.0.113.7", "/api/generate/article")
//!     .await
//!     .ensure_allowed()?;
//!
//! let breakers = core.breakers().clone();
//! let summary: String = core
//!     .cache()
//!     .get_or_set(
//!         "summary:article-42:v1",
//!         || async move {
//!             Ok::<_, resilience_core::ResilienceError>(
//!                 breakers
//!                     .fire_or_else(
//!                         "external-generation-api",
//!                         || async { Ok::<_, std::io::Error>("generated".to_string()) },
//!                         |_| "summary unavailable".to_string(),
//!                     )
//!                     .await,
//!             )
//!         },
//!         Duration::from_secs(300),
//!     )
//!     .await?;
//! # let _ = summary;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod resilience;
pub mod runtime;
pub mod store;

pub use cache::{CacheFacade, CacheStrategy, MemoryFallbackCache};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigManager, ExecutionRegime, ResilienceConfig};
pub use error::{ResilienceError, Result};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use runtime::ResilienceCore;
pub use resilience::{
    with_retry, BreakerPolicy, CircuitBreakerError, CircuitBreakerRegistry, CircuitState,
    RetryPolicy,
};
pub use store::{BackingStore, LocalStore, StoreError, UnavailableStore};
