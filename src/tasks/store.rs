//! # Task Store
//!
//! Persistence seam for sync task records. The in-memory implementation
//! backs tests and embedded deployments; the Postgres implementation is the
//! production store.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::tasks::{SyncTask, SyncTaskType};

/// Task store failure.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task not found: {id}")]
    NotFound { id: Uuid },

    #[error("database error: {message}")]
    Database { message: String },
}

impl From<sqlx::Error> for TaskStoreError {
    fn from(err: sqlx::Error) -> Self {
        TaskStoreError::Database {
            message: err.to_string(),
        }
    }
}

/// Persistence operations for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &SyncTask) -> Result<(), TaskStoreError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<SyncTask>, TaskStoreError>;

    /// Replace the stored record for `task.id`.
    async fn update(&self, task: &SyncTask) -> Result<(), TaskStoreError>;

    /// The active (pending/running) task of a type for a tenant, if any.
    async fn find_active(
        &self,
        tenant_id: Uuid,
        task_type: SyncTaskType,
    ) -> Result<Option<SyncTask>, TaskStoreError>;

    /// All active tasks for a tenant.
    async fn active_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<SyncTask>, TaskStoreError>;
}

/// Map-backed store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<Uuid, SyncTask>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: &SyncTask) -> Result<(), TaskStoreError> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<SyncTask>, TaskStoreError> {
        Ok(self.tasks.get(&id).map(|entry| entry.clone()))
    }

    async fn update(&self, task: &SyncTask) -> Result<(), TaskStoreError> {
        if !self.tasks.contains_key(&task.id) {
            return Err(TaskStoreError::NotFound { id: task.id });
        }
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn find_active(
        &self,
        tenant_id: Uuid,
        task_type: SyncTaskType,
    ) -> Result<Option<SyncTask>, TaskStoreError> {
        Ok(self
            .tasks
            .iter()
            .find(|entry| {
                entry.tenant_id == tenant_id
                    && entry.task_type == task_type
                    && entry.status.is_active()
            })
            .map(|entry| entry.value().clone()))
    }

    async fn active_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<SyncTask>, TaskStoreError> {
        Ok(self
            .tasks
            .iter()
            .filter(|entry| entry.tenant_id == tenant_id && entry.status.is_active())
            .map(|entry| entry.value().clone())
            .collect())
    }
}

/// Postgres-backed store over a `sync_tasks` table.
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SyncTaskRow {
    id: Uuid,
    tenant_id: Uuid,
    task_type: String,
    status: String,
    progress_percentage: i16,
    current_page: i32,
    total_pages: i32,
    items_processed: i32,
    items_new: i32,
    items_updated: i32,
    items_skipped: i32,
    items_failed: i32,
    error_message: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<SyncTaskRow> for SyncTask {
    type Error = TaskStoreError;

    fn try_from(row: SyncTaskRow) -> Result<Self, Self::Error> {
        let task_type = row.task_type.parse().map_err(|_| TaskStoreError::Database {
            message: format!("invalid task_type in sync_tasks row: {}", row.task_type),
        })?;
        let status = row.status.parse().map_err(|_| TaskStoreError::Database {
            message: format!("invalid status in sync_tasks row: {}", row.status),
        })?;

        Ok(SyncTask {
            id: row.id,
            tenant_id: row.tenant_id,
            task_type,
            status,
            progress_percentage: row.progress_percentage.max(0) as u8,
            current_page: row.current_page.max(0) as u32,
            total_pages: row.total_pages.max(0) as u32,
            items_processed: row.items_processed.max(0) as u32,
            items_new: row.items_new.max(0) as u32,
            items_updated: row.items_updated.max(0) as u32,
            items_skipped: row.items_skipped.max(0) as u32,
            items_failed: row.items_failed.max(0) as u32,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert(&self, task: &SyncTask) -> Result<(), TaskStoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_tasks (
                id, tenant_id, task_type, status, progress_percentage,
                current_page, total_pages, items_processed, items_new,
                items_updated, items_skipped, items_failed, error_message,
                created_at, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(task.id)
        .bind(task.tenant_id)
        .bind(task.task_type.to_string())
        .bind(task.status.to_string())
        .bind(task.progress_percentage as i16)
        .bind(task.current_page as i32)
        .bind(task.total_pages as i32)
        .bind(task.items_processed as i32)
        .bind(task.items_new as i32)
        .bind(task.items_updated as i32)
        .bind(task.items_skipped as i32)
        .bind(task.items_failed as i32)
        .bind(task.error_message.as_deref())
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<SyncTask>, TaskStoreError> {
        let row: Option<SyncTaskRow> =
            sqlx::query_as("SELECT * FROM sync_tasks WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(SyncTask::try_from).transpose()
    }

    async fn update(&self, task: &SyncTask) -> Result<(), TaskStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_tasks SET
                status = $2, progress_percentage = $3, current_page = $4,
                total_pages = $5, items_processed = $6, items_new = $7,
                items_updated = $8, items_skipped = $9, items_failed = $10,
                error_message = $11, started_at = $12, completed_at = $13
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(task.status.to_string())
        .bind(task.progress_percentage as i16)
        .bind(task.current_page as i32)
        .bind(task.total_pages as i32)
        .bind(task.items_processed as i32)
        .bind(task.items_new as i32)
        .bind(task.items_updated as i32)
        .bind(task.items_skipped as i32)
        .bind(task.items_failed as i32)
        .bind(task.error_message.as_deref())
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TaskStoreError::NotFound { id: task.id });
        }
        Ok(())
    }

    async fn find_active(
        &self,
        tenant_id: Uuid,
        task_type: SyncTaskType,
    ) -> Result<Option<SyncTask>, TaskStoreError> {
        let row: Option<SyncTaskRow> = sqlx::query_as(
            r#"
            SELECT * FROM sync_tasks
            WHERE tenant_id = $1 AND task_type = $2 AND status IN ('pending', 'running')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(task_type.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(SyncTask::try_from).transpose()
    }

    async fn active_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<SyncTask>, TaskStoreError> {
        let rows: Vec<SyncTaskRow> = sqlx::query_as(
            r#"
            SELECT * FROM sync_tasks
            WHERE tenant_id = $1 AND status IN ('pending', 'running')
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SyncTask::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::SyncTaskStatus;

    #[tokio::test]
    async fn insert_and_fetch() {
        let store = InMemoryTaskStore::new();
        let task = SyncTask::new(Uuid::new_v4(), SyncTaskType::Orders);

        store.insert(&task).await.unwrap();
        let fetched = store.fetch(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, task.id);
        assert_eq!(fetched.status, SyncTaskStatus::Pending);

        assert!(store.fetch(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_requires_existing_row() {
        let store = InMemoryTaskStore::new();
        let task = SyncTask::new(Uuid::new_v4(), SyncTaskType::Products);

        let err = store.update(&task).await.unwrap_err();
        assert!(matches!(err, TaskStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn find_active_ignores_terminal_tasks() {
        let store = InMemoryTaskStore::new();
        let tenant = Uuid::new_v4();

        let mut completed = SyncTask::new(tenant, SyncTaskType::Orders);
        completed.status = SyncTaskStatus::Completed;
        store.insert(&completed).await.unwrap();

        assert!(store
            .find_active(tenant, SyncTaskType::Orders)
            .await
            .unwrap()
            .is_none());

        let pending = SyncTask::new(tenant, SyncTaskType::Orders);
        store.insert(&pending).await.unwrap();

        let active = store
            .find_active(tenant, SyncTaskType::Orders)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, pending.id);

        // Other tenants see nothing.
        assert!(store
            .find_active(Uuid::new_v4(), SyncTaskType::Orders)
            .await
            .unwrap()
            .is_none());
    }
}
