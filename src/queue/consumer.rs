//! # Sync Queue Consumer
//!
//! Bounded worker pools draining the sync channels. Each delivery is handed
//! to the matching executor through the resilience gateway; failures
//! republish the envelope with its retry count incremented until the budget
//! is spent, at which point the message is rejected without requeue and the
//! dead-letter consumer marks the task failed.
//!
//! Delivery is at-least-once: a message whose task already reached a
//! terminal state is acknowledged and skipped, so redeliveries never
//! double-count results.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::QueueSettings;
use crate::executor::ExecutorRegistry;
use crate::queue::broker::{Broker, Delivery};
use crate::queue::QueueError;
use crate::resilience::ResilienceGateway;
use crate::tasks::SyncTaskService;

/// Handle over the spawned worker pools.
pub struct ConsumerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl ConsumerPool {
    /// Signal every worker to stop after its current message and wait for
    /// the pools to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        futures::future::join_all(self.handles).await;
        info!("Consumer pools stopped");
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }
}

/// Consumer wiring broker deliveries to executors and the task store.
#[derive(Clone)]
pub struct SyncQueueConsumer {
    broker: Arc<dyn Broker>,
    tasks: SyncTaskService,
    gateway: Arc<ResilienceGateway>,
    executors: Arc<ExecutorRegistry>,
    settings: QueueSettings,
}

impl SyncQueueConsumer {
    pub fn new(
        broker: Arc<dyn Broker>,
        tasks: SyncTaskService,
        gateway: Arc<ResilienceGateway>,
        executors: Arc<ExecutorRegistry>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            broker,
            tasks,
            gateway,
            executors,
            settings,
        }
    }

    /// Spawn the per-channel worker pools plus the dead-letter worker.
    pub fn start(&self) -> ConsumerPool {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        let channels = [
            (
                self.settings.orders_channel.clone(),
                self.settings.orders_concurrency,
            ),
            (
                self.settings.products_channel.clone(),
                self.settings.products_concurrency,
            ),
            (
                self.settings.financial_channel.clone(),
                self.settings.financial_concurrency,
            ),
        ];

        for (channel, concurrency) in channels {
            info!(channel = %channel, concurrency, "Starting consumer workers");
            for _ in 0..concurrency.max(1) {
                let consumer = self.clone();
                let channel = channel.clone();
                let shutdown = shutdown_rx.clone();
                handles.push(tokio::spawn(async move {
                    consumer.worker_loop(channel, shutdown, false).await;
                }));
            }
        }

        let consumer = self.clone();
        let dlq = self.settings.dead_letter_channel.clone();
        let shutdown = shutdown_rx.clone();
        info!(channel = %dlq, "Starting dead letter worker");
        handles.push(tokio::spawn(async move {
            consumer.worker_loop(dlq, shutdown, true).await;
        }));

        ConsumerPool {
            handles,
            shutdown: shutdown_tx,
        }
    }

    async fn worker_loop(
        &self,
        channel: String,
        mut shutdown: watch::Receiver<bool>,
        dead_letter: bool,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.broker.receive(&channel).await {
                Ok(Some(delivery)) => {
                    let result = if dead_letter {
                        self.process_dead_letter(&delivery).await
                    } else {
                        self.process(&delivery).await
                    };
                    if let Err(err) = result {
                        error!(
                            channel = %channel,
                            task_id = %delivery.message.task_id,
                            error = %err,
                            "Delivery handling failed"
                        );
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.settings.poll_interval()) => {}
                    }
                }
                Err(err) => {
                    error!(channel = %channel, error = %err, "Broker receive failed");
                    tokio::time::sleep(self.settings.poll_interval()).await;
                }
            }
        }
    }

    /// Handle one delivery from a sync channel.
    pub async fn process(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let message = &delivery.message;
        info!(
            task_id = %message.task_id,
            tenant_id = %message.tenant_id,
            task_type = %message.task_type,
            retry_count = message.retry_count,
            correlation_id = %message.correlation_id,
            "Processing sync message"
        );

        let Some(task) = self.tasks.store().fetch(message.task_id).await? else {
            warn!(task_id = %message.task_id, "Message references unknown task, dropping");
            return self.broker.ack(delivery).await;
        };

        // At-least-once tolerance: a finished task means this is a
        // redelivery whose work already happened.
        if task.status.is_terminal() {
            debug!(
                task_id = %message.task_id,
                status = %task.status,
                "Task already in terminal state, skipping redelivery"
            );
            return self.broker.ack(delivery).await;
        }

        let Some(executor) = self.executors.resolve(message.task_type) else {
            let err = QueueError::NoExecutor {
                task_type: message.task_type.to_string(),
            };
            self.tasks
                .fail_task(message.task_id, &err.to_string())
                .await?;
            self.broker.ack(delivery).await?;
            return Err(err);
        };

        self.tasks.start_task(message.task_id).await?;

        let task_id = message.task_id;
        let tenant_id = message.tenant_id;
        let outcome = self
            .gateway
            .execute_sync_operation(tenant_id, move || {
                let executor = Arc::clone(&executor);
                async move { executor.execute(task_id, tenant_id).await }
            })
            .await;

        match outcome {
            Ok(outcome) => {
                self.tasks.complete_task(message.task_id, outcome.items).await?;
                self.broker.ack(delivery).await?;
                info!(task_id = %message.task_id, "Sync completed");
                Ok(())
            }
            Err(err) => self.handle_failure(delivery, &err.to_string()).await,
        }
    }

    /// Failure path: republish with an incremented retry count while budget
    /// remains, otherwise reject without requeue so the broker dead-letters
    /// the message. The envelope's own counter is authoritative; transport
    /// redelivery metadata is ignored.
    async fn handle_failure(&self, delivery: &Delivery, error: &str) -> Result<(), QueueError> {
        let message = &delivery.message;
        error!(
            task_id = %message.task_id,
            retry_count = message.retry_count,
            error,
            "Sync failed"
        );

        if message.retry_count >= self.settings.max_retry_attempts {
            error!(
                task_id = %message.task_id,
                attempts = message.attempt_count(),
                "Retry budget exhausted, rejecting to dead letter channel"
            );
            return self.broker.reject(delivery, false).await;
        }

        let retried = message.with_incremented_retry();
        self.broker.publish(&delivery.channel, &retried).await?;
        self.broker.ack(delivery).await?;
        warn!(
            task_id = %message.task_id,
            retry_count = retried.retry_count,
            "Sync message requeued for retry"
        );
        Ok(())
    }

    /// Handle one delivery from the dead-letter channel: mark the task
    /// failed with the total attempt count. Never resubmits.
    pub async fn process_dead_letter(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let message = &delivery.message;
        error!(
            task_id = %message.task_id,
            tenant_id = %message.tenant_id,
            task_type = %message.task_type,
            retry_count = message.retry_count,
            correlation_id = %message.correlation_id,
            "Dead letter message received"
        );

        let diagnostic = format!(
            "Max retries exceeded. Message moved to dead letter queue after {} attempts.",
            message.attempt_count()
        );
        self.tasks.fail_task(message.task_id, &diagnostic).await?;
        self.broker.ack(delivery).await
    }
}
