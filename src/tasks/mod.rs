//! # Sync Tasks
//!
//! Task records, lifecycle state machine and the store/service pair the
//! queue pipeline mutates. Pending → Running → Completed | Failed; terminal
//! states are final.

pub mod record;
pub mod service;
pub mod store;
pub mod types;

pub use record::{SyncTask, ERROR_MESSAGE_LIMIT};
pub use service::{ItemCounts, StartSyncResponse, SyncTaskService, SyncTaskStatusView};
pub use store::{InMemoryTaskStore, PgTaskStore, TaskStore, TaskStoreError};
pub use types::{SyncTaskStatus, SyncTaskType};
