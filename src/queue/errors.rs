//! # Queue Error Types
//!
//! Structured errors for the transport layer, with conversions from the
//! underlying broker and serialization crates.

use thiserror::Error;

use crate::tasks::TaskStoreError;

/// Queue layer failure.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker operation failed: {channel}: {operation}: {message}")]
    BrokerOperation {
        channel: String,
        operation: String,
        message: String,
    },

    #[error("broker connection error: {message}")]
    BrokerConnection { message: String },

    #[error("message serialization error: {message}")]
    Serialization { message: String },

    #[error("message deserialization error: {message}")]
    Deserialization { message: String },

    #[error("task store error: {0}")]
    Store(#[from] TaskStoreError),

    #[error("no executor registered for task type: {task_type}")]
    NoExecutor { task_type: String },
}

impl QueueError {
    pub fn broker_operation(
        channel: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BrokerOperation {
            channel: channel.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn broker_connection(message: impl Into<String>) -> Self {
        Self::BrokerConnection {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() {
            Self::Deserialization {
                message: err.to_string(),
            }
        } else {
            Self::Serialization {
                message: err.to_string(),
            }
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::BrokerConnection {
            message: err.to_string(),
        }
    }
}

impl From<pgmq::errors::PgmqError> for QueueError {
    fn from(err: pgmq::errors::PgmqError) -> Self {
        Self::broker_operation("unknown", "pgmq", err.to_string())
    }
}

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = QueueError::broker_operation("sync.orders", "publish", "connection reset");
        let text = err.to_string();
        assert!(text.contains("sync.orders"));
        assert!(text.contains("publish"));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn serde_errors_classify() {
        let err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let queue_err: QueueError = err.into();
        assert!(matches!(queue_err, QueueError::Deserialization { .. }));
    }
}
