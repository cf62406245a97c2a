//! Backing store error types

use crate::resilience::retry::ErrorCode;
use thiserror::Error;

/// Errors that can occur during backing store operations
///
/// Connection-class and timeout errors carry a driver-style code (`ECONNRESET`,
/// `ETIMEDOUT`, ...) and server replies carry the server's error code (`BUSY`,
/// `LOADING`, ...) so the retry executor can classify them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transport-level failure talking to the store
    #[error("Store connection error: {message}")]
    Connection {
        code: Option<String>,
        message: String,
    },

    /// Store operation exceeded its deadline
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// The store replied with an error
    #[error("Store backend error: {message}")]
    Backend {
        code: Option<String>,
        message: String,
    },

    /// No store is configured or connected
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn connection(code: &str, message: impl Into<String>) -> Self {
        Self::Connection {
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    pub fn backend(code: Option<&str>, message: impl Into<String>) -> Self {
        Self::Backend {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// Whether this error means the transport is gone (as opposed to a bad reply)
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout(_) | Self::Unavailable(_)
        )
    }
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> Option<&str> {
        match self {
            Self::Connection { code, .. } | Self::Backend { code, .. } => code.as_deref(),
            Self::Timeout(_) => Some("ETIMEDOUT"),
            Self::Unavailable(_) => None,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
