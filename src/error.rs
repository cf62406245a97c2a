//! Error types for the resilience layer.
//!
//! Component errors (`StoreError`, `CircuitBreakerError`,
//! `ConfigurationError`) convert into [`ResilienceError`], which also carries
//! the HTTP status a caller should surface.

use crate::config::ConfigurationError;
use crate::resilience::CircuitBreakerError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResilienceError {
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResilienceError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimited { .. } => 429,
            Self::ServiceUnavailable(_) | Self::CircuitBreakerOpen(_) => 503,
            _ => 500,
        }
    }

    /// `Retry-After` seconds, when the error carries one
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<CircuitBreakerError> for ResilienceError {
    fn from(error: CircuitBreakerError) -> Self {
        if error.is_short_circuit() {
            ResilienceError::CircuitBreakerOpen(error.component().to_string())
        } else {
            ResilienceError::ServiceUnavailable(error.component().to_string())
        }
    }
}

impl From<ConfigurationError> for ResilienceError {
    fn from(error: ConfigurationError) -> Self {
        ResilienceError::Configuration(error.to_string())
    }
}

impl From<serde_json::Error> for ResilienceError {
    fn from(error: serde_json::Error) -> Self {
        ResilienceError::Serialization(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, ResilienceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::RejectionReason;

    #[test]
    fn test_status_codes() {
        assert_eq!(ResilienceError::RateLimited { retry_after: 3 }.status_code(), 429);
        assert_eq!(
            ResilienceError::ServiceUnavailable("ai".into()).status_code(),
            503
        );
        assert_eq!(
            ResilienceError::from(StoreError::Timeout("GET".into())).status_code(),
            500
        );
    }

    #[test]
    fn test_circuit_errors_map_to_503() {
        let open = CircuitBreakerError::Unavailable {
            component: "external-generation-api".into(),
            reason: RejectionReason::CircuitOpen,
        };
        let failed = CircuitBreakerError::Unavailable {
            component: "external-generation-api".into(),
            reason: RejectionReason::OperationFailed,
        };

        let open = ResilienceError::from(open);
        assert!(matches!(open, ResilienceError::CircuitBreakerOpen(_)));
        assert_eq!(open.status_code(), 503);
        assert_eq!(ResilienceError::from(failed).status_code(), 503);
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(
            ResilienceError::RateLimited { retry_after: 12 }.retry_after(),
            Some(12)
        );
        assert_eq!(ResilienceError::Internal("x".into()).retry_after(), None);
    }
}
