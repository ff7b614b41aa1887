//! Top-level error type grouping the crate's domains.

use thiserror::Error;

use crate::config::ConfigError;
use crate::queue::QueueError;
use crate::resilience::ResilienceError;
use crate::tasks::TaskStoreError;

/// Any failure surfaced by marketsync-core.
#[derive(Debug, Error)]
pub enum MarketSyncError {
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    TaskStore(#[from] TaskStoreError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, MarketSyncError>;
