//! # Sync Executor Seam
//!
//! The narrow interface the pipeline invokes for the actual external-API
//! work. Executors live outside this crate; they are registered per task
//! type and must be idempotent per task id, because at-least-once delivery
//! can re-invoke them after a crash.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::resilience::ApiCallError;
use crate::tasks::{ItemCounts, SyncTaskType};

/// Result of one executed sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pages_processed: u32,
    pub items: ItemCounts,
}

/// One synchronization routine, e.g. an order or product pull. Failures are
/// classified at the call boundary so the gateway's retry layer can act on
/// them.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    async fn execute(&self, task_id: Uuid, tenant_id: Uuid) -> Result<SyncOutcome, ApiCallError>;
}

/// Task-type → executor lookup, populated at wiring time.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: DashMap<SyncTaskType, Arc<dyn SyncExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task_type: SyncTaskType, executor: Arc<dyn SyncExecutor>) {
        self.executors.insert(task_type, executor);
    }

    pub fn resolve(&self, task_type: SyncTaskType) -> Option<Arc<dyn SyncExecutor>> {
        self.executors
            .get(&task_type)
            .map(|entry| Arc::clone(entry.value()))
    }
}

/// Scripted executor for tests.
pub struct MockSyncExecutor {
    outcome: Result<SyncOutcome, ApiCallError>,
    invocations: AtomicU32,
}

impl MockSyncExecutor {
    pub fn succeeding(outcome: SyncOutcome) -> Self {
        Self {
            outcome: Ok(outcome),
            invocations: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Err(ApiCallError::server(503, "marketplace unavailable")),
            invocations: AtomicU32::new(0),
        }
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncExecutor for MockSyncExecutor {
    async fn execute(&self, _task_id: Uuid, _tenant_id: Uuid) -> Result<SyncOutcome, ApiCallError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
