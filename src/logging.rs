//! # Structured Logging Module
//!
//! Environment-aware structured logging on the tracing ecosystem. Console
//! output in development and test, JSON lines in production. `RUST_LOG`
//! overrides the environment-derived level.
//!
//! The `log_*` helpers emit the observability events of this crate with a
//! stable `event` field so log pipelines can match on them.

use crate::config::ConfigManager;
use crate::resilience::CircuitState;
use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if environment == "production" {
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter)
                .boxed()
        };

        // A global subscriber may already be installed by the host application
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            pid = std::process::id(),
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    ConfigManager::detect_environment()
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log a circuit breaker state transition
pub fn log_circuit_transition(
    component: &str,
    from: CircuitState,
    to: CircuitState,
    consecutive_failures: u32,
    reason: &str,
) {
    match to {
        CircuitState::Open => tracing::error!(
            event = "circuit_transition",
            component = %component,
            from_state = %from,
            to_state = %to,
            consecutive_failures = consecutive_failures,
            reason = %reason,
            timestamp = %Utc::now().to_rfc3339(),
            "Circuit breaker opened (failing fast)"
        ),
        CircuitState::HalfOpen => tracing::info!(
            event = "circuit_transition",
            component = %component,
            from_state = %from,
            to_state = %to,
            reason = %reason,
            timestamp = %Utc::now().to_rfc3339(),
            "Circuit breaker half-open (testing recovery)"
        ),
        CircuitState::Closed => tracing::info!(
            event = "circuit_transition",
            component = %component,
            from_state = %from,
            to_state = %to,
            reason = %reason,
            timestamp = %Utc::now().to_rfc3339(),
            "Circuit breaker closed"
        ),
    }
}

/// Log an operation that fell back to the memory tier
pub fn log_memory_fallback(key: &str, operation: &str, reason: &str) {
    tracing::warn!(
        event = "memory_fallback",
        key = %key,
        operation = %operation,
        reason = %reason,
        timestamp = %Utc::now().to_rfc3339(),
        "Backing store unavailable, using memory tier"
    );
}

/// Log a rejected request
pub fn log_rate_limit_rejection(key: &str, count: u64, limit: u64, reset_at_epoch_ms: i64) {
    tracing::warn!(
        event = "rate_limit_rejection",
        key = %key,
        count = count,
        limit = limit,
        reset_at_epoch_ms = reset_at_epoch_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "Rate limit exceeded"
    );
}
