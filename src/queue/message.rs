//! # Sync Message Envelope
//!
//! Wire format for queued sync work, derived 1:1 from a task at enqueue
//! time. Envelopes are immutable; a retry produces a new value with only the
//! retry count incremented, so the correlation id traces the whole attempt
//! chain across redeliveries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tasks::{SyncTask, SyncTaskType};

/// Content-type marker attached to serialized envelopes.
pub const CONTENT_TYPE: &str = "application/json";

/// Envelope carried by the transport for one sync task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub task_id: Uuid,
    pub tenant_id: Uuid,
    pub task_type: SyncTaskType,
    /// Deliveries already failed for this message. Authoritative over any
    /// transport-level redelivery count.
    pub retry_count: u32,
    /// Stable across every redelivery of the same logical attempt chain.
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

impl SyncMessage {
    /// Build the envelope for a task's first enqueue, generating a fresh
    /// correlation id.
    pub fn from_task(task: &SyncTask) -> Self {
        Self {
            task_id: task.id,
            tenant_id: task.tenant_id,
            task_type: task.task_type,
            retry_count: 0,
            correlation_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Copy of this envelope with the retry count incremented; every other
    /// field is preserved verbatim.
    pub fn with_incremented_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }

    /// Deliveries so far, assuming this envelope was just delivered.
    pub fn attempt_count(&self) -> u32 {
        self.retry_count + 1
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_json(json: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }
}
