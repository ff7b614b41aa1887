//! # Sync Task Record
//!
//! Durable state of one unit of synchronization work: lifecycle status,
//! progress counters and timestamps. Created by submitters, mutated only by
//! the queue consumer and the task service, never deleted here (retention is
//! an external concern).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tasks::{SyncTaskStatus, SyncTaskType};

/// Persisted error messages are capped so a pathological upstream error
/// cannot bloat the store.
pub const ERROR_MESSAGE_LIMIT: usize = 1000;

/// One unit of synchronization work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub task_type: SyncTaskType,
    pub status: SyncTaskStatus,
    /// 0..=99 while running, 100 on completion.
    pub progress_percentage: u8,
    pub current_page: u32,
    pub total_pages: u32,
    pub items_processed: u32,
    pub items_new: u32,
    pub items_updated: u32,
    pub items_skipped: u32,
    pub items_failed: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncTask {
    /// Create a new pending task.
    pub fn new(tenant_id: Uuid, task_type: SyncTaskType) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            task_type,
            status: SyncTaskStatus::Pending,
            progress_percentage: 0,
            current_page: 0,
            total_pages: 0,
            items_processed: 0,
            items_new: 0,
            items_updated: 0,
            items_skipped: 0,
            items_failed: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Progress percentage for a page position, capped at 99 so only an
    /// explicit completion reports 100.
    pub fn page_progress(current_page: u32, total_pages: u32) -> u8 {
        if total_pages == 0 {
            return 0;
        }
        let pct = (u64::from(current_page) * 100 / u64::from(total_pages)).min(99);
        pct as u8
    }

    /// Human-readable status line for polling clients.
    pub fn status_message(&self) -> String {
        match self.status {
            SyncTaskStatus::Pending => {
                "Sync operation is queued and waiting to start.".to_string()
            }
            SyncTaskStatus::Running => format!(
                "Syncing... Page {}/{} ({}%)",
                self.current_page, self.total_pages, self.progress_percentage
            ),
            SyncTaskStatus::Completed => format!(
                "Sync completed. {} items processed: {} new, {} updated, {} skipped.",
                self.items_processed, self.items_new, self.items_updated, self.items_skipped
            ),
            SyncTaskStatus::Failed => format!(
                "Sync failed: {}",
                self.error_message.as_deref().unwrap_or("Unknown error")
            ),
        }
    }
}

/// Truncate an error message to the persisted limit.
pub fn truncate_error(message: &str) -> String {
    if message.len() <= ERROR_MESSAGE_LIMIT {
        return message.to_string();
    }
    let mut end = ERROR_MESSAGE_LIMIT;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}
