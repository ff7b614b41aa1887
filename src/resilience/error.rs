//! # Resilience Error Types
//!
//! Structured failure taxonomy for the protection chain. Fast-fail rejections
//! from the protection layer carry a suggested backoff so callers can delay
//! before resubmitting.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a wrapped outbound operation, classified at the call
/// boundary so the retry layer can decide what is worth another attempt.
#[derive(Debug, Clone, Error)]
pub enum ApiCallError {
    /// Credentials rejected by the remote API. Never retried.
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Remote-side failure (5xx equivalent). Retried.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Connectivity failure before a response was produced. Retried.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Anything else. Surfaces as-is without consuming retry budget.
    #[error("{message}")]
    Other { message: String },
}

impl ApiCallError {
    pub fn auth(status: u16, message: impl Into<String>) -> Self {
        Self::Auth {
            status,
            message: message.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether the retry layer may re-invoke the operation for this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Connection { .. })
    }
}

/// Failure surfaced by the resilience gateway.
///
/// `CircuitOpen`, `RateLimitExceeded` and `BulkheadFull` are synchronous
/// rejections from the protection layer itself; the wrapped operation was
/// never invoked for those.
#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("circuit breaker open for {group}; retry after {retry_after:?}")]
    CircuitOpen { group: String, retry_after: Duration },

    #[error("rate limit exceeded for tenant {tenant_id}: maximum {rate} requests per second")]
    RateLimitExceeded {
        tenant_id: Uuid,
        rate: u32,
        retry_after: Duration,
    },

    #[error("bulkhead {name} full: {max_concurrent} calls already in flight")]
    BulkheadFull {
        name: String,
        max_concurrent: usize,
        retry_after: Duration,
    },

    #[error("operation timed out after {deadline:?}")]
    Timeout { deadline: Duration },

    #[error("retries exhausted after {attempts} attempts")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: ApiCallError,
    },

    #[error("authentication failed")]
    AuthError {
        #[source]
        source: ApiCallError,
    },

    #[error("operation failed")]
    Other {
        #[source]
        source: ApiCallError,
    },
}

impl ResilienceError {
    /// Whether the caller may usefully resubmit the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. }
                | Self::RateLimitExceeded { .. }
                | Self::BulkheadFull { .. }
                | Self::Timeout { .. }
        )
    }

    /// Suggested wait before resubmitting, where the protection layer can
    /// estimate one.
    pub fn backoff(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. }
            | Self::RateLimitExceeded { retry_after, .. }
            | Self::BulkheadFull { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
