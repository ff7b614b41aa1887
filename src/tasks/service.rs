//! # Sync Task Service
//!
//! Lifecycle operations over the task store: creation with duplicate
//! suppression, progress updates, terminal transitions and the status
//! queries polling clients consume. Terminal states are final; updates
//! against a completed or failed task are ignored here rather than
//! corrupting history.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::tasks::record::truncate_error;
use crate::tasks::{SyncTask, SyncTaskStatus, SyncTaskType, TaskStore, TaskStoreError};

/// Counters reported by an executor on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub processed: u32,
    pub new: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
}

/// Response returned to a submitter: poll the task id for progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSyncResponse {
    pub task_id: Uuid,
    pub tenant_id: Uuid,
    pub task_type: SyncTaskType,
    pub status: SyncTaskStatus,
    pub message: String,
}

/// Snapshot returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTaskStatusView {
    pub task_id: Uuid,
    pub tenant_id: Uuid,
    pub task_type: SyncTaskType,
    pub status: SyncTaskStatus,
    pub progress_percentage: u8,
    pub current_page: u32,
    pub total_pages: u32,
    pub items: ItemCounts,
    pub error_message: Option<String>,
    pub message: String,
}

impl From<SyncTask> for SyncTaskStatusView {
    fn from(task: SyncTask) -> Self {
        let message = task.status_message();
        Self {
            task_id: task.id,
            tenant_id: task.tenant_id,
            task_type: task.task_type,
            status: task.status,
            progress_percentage: task.progress_percentage,
            current_page: task.current_page,
            total_pages: task.total_pages,
            items: ItemCounts {
                processed: task.items_processed,
                new: task.items_new,
                updated: task.items_updated,
                skipped: task.items_skipped,
                failed: task.items_failed,
            },
            error_message: task.error_message,
            message,
        }
    }
}

/// Task lifecycle service over a pluggable store.
#[derive(Clone)]
pub struct SyncTaskService {
    store: Arc<dyn TaskStore>,
}

impl SyncTaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    /// Create a pending task. If an active task of the same type already
    /// exists for the tenant it is returned instead, so double submissions
    /// cannot fan out duplicate work.
    pub async fn create_task(
        &self,
        tenant_id: Uuid,
        task_type: SyncTaskType,
    ) -> Result<SyncTask, TaskStoreError> {
        if let Some(existing) = self.store.find_active(tenant_id, task_type).await? {
            warn!(
                tenant_id = %tenant_id,
                task_type = %task_type,
                task_id = %existing.id,
                "Active task already exists, suppressing duplicate submission"
            );
            return Ok(existing);
        }

        let task = SyncTask::new(tenant_id, task_type);
        self.store.insert(&task).await?;
        info!(task_id = %task.id, tenant_id = %tenant_id, task_type = %task_type, "Sync task created");
        Ok(task)
    }

    /// Mark a task running. A no-op for tasks already in a terminal state.
    pub async fn start_task(&self, task_id: Uuid) -> Result<(), TaskStoreError> {
        let mut task = self.fetch_required(task_id).await?;
        if task.status.is_terminal() {
            debug!(task_id = %task_id, status = %task.status, "Ignoring start for terminal task");
            return Ok(());
        }

        task.status = SyncTaskStatus::Running;
        task.started_at = Some(chrono::Utc::now());
        self.store.update(&task).await?;
        info!(task_id = %task_id, tenant_id = %task.tenant_id, "Sync task started");
        Ok(())
    }

    /// Update progress counters for a running task. Counters only move
    /// forward; a stale report cannot roll progress back.
    pub async fn update_progress(
        &self,
        task_id: Uuid,
        current_page: u32,
        total_pages: u32,
        items: ItemCounts,
    ) -> Result<(), TaskStoreError> {
        let mut task = self.fetch_required(task_id).await?;
        if task.status.is_terminal() {
            debug!(task_id = %task_id, status = %task.status, "Ignoring progress for terminal task");
            return Ok(());
        }

        task.current_page = task.current_page.max(current_page);
        task.total_pages = task.total_pages.max(total_pages);
        task.progress_percentage = task
            .progress_percentage
            .max(SyncTask::page_progress(task.current_page, task.total_pages));
        task.items_processed = task.items_processed.max(items.processed);
        task.items_new = task.items_new.max(items.new);
        task.items_updated = task.items_updated.max(items.updated);
        task.items_skipped = task.items_skipped.max(items.skipped);
        task.items_failed = task.items_failed.max(items.failed);
        self.store.update(&task).await?;

        debug!(
            task_id = %task_id,
            page = task.current_page,
            total_pages = task.total_pages,
            items_processed = task.items_processed,
            "Sync task progress"
        );
        Ok(())
    }

    /// Mark a task completed with final counters.
    pub async fn complete_task(
        &self,
        task_id: Uuid,
        items: ItemCounts,
    ) -> Result<(), TaskStoreError> {
        let mut task = self.fetch_required(task_id).await?;
        if task.status.is_terminal() {
            debug!(task_id = %task_id, status = %task.status, "Ignoring completion for terminal task");
            return Ok(());
        }

        task.status = SyncTaskStatus::Completed;
        task.progress_percentage = 100;
        task.items_processed = items.processed;
        task.items_new = items.new;
        task.items_updated = items.updated;
        task.items_skipped = items.skipped;
        task.items_failed = items.failed;
        task.completed_at = Some(chrono::Utc::now());
        self.store.update(&task).await?;

        info!(
            task_id = %task_id,
            items_processed = items.processed,
            items_new = items.new,
            items_updated = items.updated,
            items_skipped = items.skipped,
            "Sync task completed"
        );
        Ok(())
    }

    /// Mark a task failed with a diagnostic message.
    pub async fn fail_task(&self, task_id: Uuid, error_message: &str) -> Result<(), TaskStoreError> {
        let mut task = self.fetch_required(task_id).await?;
        if task.status.is_terminal() {
            debug!(task_id = %task_id, status = %task.status, "Ignoring failure for terminal task");
            return Ok(());
        }

        task.status = SyncTaskStatus::Failed;
        task.error_message = Some(truncate_error(error_message));
        task.completed_at = Some(chrono::Utc::now());
        self.store.update(&task).await?;

        error!(task_id = %task_id, error = %error_message, "Sync task failed");
        Ok(())
    }

    /// Current status for a task id.
    pub async fn task_status(&self, task_id: Uuid) -> Result<SyncTaskStatusView, TaskStoreError> {
        let task = self.fetch_required(task_id).await?;
        Ok(task.into())
    }

    /// Whether a submission of this type is currently in flight.
    pub async fn has_active_task(
        &self,
        tenant_id: Uuid,
        task_type: SyncTaskType,
    ) -> Result<bool, TaskStoreError> {
        Ok(self.store.find_active(tenant_id, task_type).await?.is_some())
    }

    /// All in-flight tasks for a tenant.
    pub async fn active_tasks(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<SyncTaskStatusView>, TaskStoreError> {
        let tasks = self.store.active_for_tenant(tenant_id).await?;
        Ok(tasks.into_iter().map(Into::into).collect())
    }

    /// Submit-then-poll payload for a freshly created task.
    pub fn start_response(&self, task: &SyncTask) -> StartSyncResponse {
        StartSyncResponse {
            task_id: task.id,
            tenant_id: task.tenant_id,
            task_type: task.task_type,
            status: task.status,
            message: "Sync operation started. Poll the task status to check progress.".to_string(),
        }
    }

    async fn fetch_required(&self, task_id: Uuid) -> Result<SyncTask, TaskStoreError> {
        self.store
            .fetch(task_id)
            .await?
            .ok_or(TaskStoreError::NotFound { id: task_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::InMemoryTaskStore;

    fn service() -> SyncTaskService {
        SyncTaskService::new(Arc::new(InMemoryTaskStore::new()))
    }

    #[tokio::test]
    async fn duplicate_submission_returns_existing_task() {
        let service = service();
        let tenant = Uuid::new_v4();

        let first = service
            .create_task(tenant, SyncTaskType::Orders)
            .await
            .unwrap();
        let second = service
            .create_task(tenant, SyncTaskType::Orders)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        // A different type is unaffected.
        let other = service
            .create_task(tenant, SyncTaskType::Products)
            .await
            .unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn lifecycle_happy_path() {
        let service = service();
        let task = service
            .create_task(Uuid::new_v4(), SyncTaskType::Orders)
            .await
            .unwrap();

        service.start_task(task.id).await.unwrap();
        let view = service.task_status(task.id).await.unwrap();
        assert_eq!(view.status, SyncTaskStatus::Running);

        service
            .update_progress(
                task.id,
                5,
                10,
                ItemCounts {
                    processed: 50,
                    new: 20,
                    updated: 25,
                    skipped: 5,
                    failed: 0,
                },
            )
            .await
            .unwrap();
        let view = service.task_status(task.id).await.unwrap();
        assert_eq!(view.progress_percentage, 50);

        service
            .complete_task(
                task.id,
                ItemCounts {
                    processed: 100,
                    new: 40,
                    updated: 50,
                    skipped: 10,
                    failed: 0,
                },
            )
            .await
            .unwrap();
        let view = service.task_status(task.id).await.unwrap();
        assert_eq!(view.status, SyncTaskStatus::Completed);
        assert_eq!(view.progress_percentage, 100);
        assert_eq!(view.items.processed, 100);
    }

    #[tokio::test]
    async fn terminal_states_are_frozen() {
        let service = service();
        let task = service
            .create_task(Uuid::new_v4(), SyncTaskType::Financial)
            .await
            .unwrap();

        service
            .complete_task(task.id, ItemCounts::default())
            .await
            .unwrap();

        // Later failure and progress reports are ignored.
        service.fail_task(task.id, "late failure").await.unwrap();
        service
            .update_progress(
                task.id,
                9,
                10,
                ItemCounts {
                    processed: 999,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = service.task_status(task.id).await.unwrap();
        assert_eq!(view.status, SyncTaskStatus::Completed);
        assert_eq!(view.items.processed, 0);
        assert!(view.error_message.is_none());
    }

    #[tokio::test]
    async fn progress_is_monotonic() {
        let service = service();
        let task = service
            .create_task(Uuid::new_v4(), SyncTaskType::Orders)
            .await
            .unwrap();
        service.start_task(task.id).await.unwrap();

        service
            .update_progress(
                task.id,
                6,
                10,
                ItemCounts {
                    processed: 60,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // A stale report from an earlier page cannot roll counters back.
        service
            .update_progress(
                task.id,
                4,
                10,
                ItemCounts {
                    processed: 40,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = service.task_status(task.id).await.unwrap();
        assert_eq!(view.current_page, 6);
        assert_eq!(view.items.processed, 60);
        assert_eq!(view.progress_percentage, 60);
    }

    #[tokio::test]
    async fn failure_truncates_long_messages() {
        let service = service();
        let task = service
            .create_task(Uuid::new_v4(), SyncTaskType::Returns)
            .await
            .unwrap();

        let long = "e".repeat(2000);
        service.fail_task(task.id, &long).await.unwrap();

        let view = service.task_status(task.id).await.unwrap();
        assert_eq!(view.error_message.unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn has_active_task_tracks_lifecycle() {
        let service = service();
        let tenant = Uuid::new_v4();

        assert!(!service
            .has_active_task(tenant, SyncTaskType::Orders)
            .await
            .unwrap());

        let task = service
            .create_task(tenant, SyncTaskType::Orders)
            .await
            .unwrap();
        assert!(service
            .has_active_task(tenant, SyncTaskType::Orders)
            .await
            .unwrap());

        service
            .complete_task(task.id, ItemCounts::default())
            .await
            .unwrap();
        assert!(!service
            .has_active_task(tenant, SyncTaskType::Orders)
            .await
            .unwrap());
    }
}
