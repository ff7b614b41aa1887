//! # Sync Queue Producer
//!
//! Converts task records into envelopes and publishes them to the channel
//! matching their task type. Publishing is fire-and-forget from the
//! submitter's point of view; progress is observed by polling the task.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::QueueSettings;
use crate::queue::{Broker, QueueError, SyncMessage};
use crate::tasks::SyncTask;

/// Producer routing sync work onto the transport.
#[derive(Clone)]
pub struct SyncQueueProducer {
    broker: Arc<dyn Broker>,
    settings: QueueSettings,
}

impl SyncQueueProducer {
    pub fn new(broker: Arc<dyn Broker>, settings: QueueSettings) -> Self {
        Self { broker, settings }
    }

    /// Create every channel this producer can route to, including the
    /// dead-letter channel.
    pub async fn ensure_channels(&self) -> Result<(), QueueError> {
        for channel in [
            &self.settings.orders_channel,
            &self.settings.products_channel,
            &self.settings.financial_channel,
            &self.settings.dead_letter_channel,
        ] {
            self.broker.ensure_channel(channel).await?;
        }
        Ok(())
    }

    /// Wrap a task in a fresh envelope (new correlation id) and publish it
    /// to the channel for its task type. Returns the envelope so callers can
    /// log the correlation id.
    pub async fn enqueue(&self, task: &SyncTask) -> Result<SyncMessage, QueueError> {
        let message = SyncMessage::from_task(task);
        let channel = self.settings.channel_for(task.task_type);
        self.broker.publish(channel, &message).await?;

        info!(
            task_id = %task.id,
            tenant_id = %task.tenant_id,
            task_type = %task.task_type,
            channel,
            correlation_id = %message.correlation_id,
            "Sync task enqueued"
        );
        Ok(message)
    }

    /// Republish an existing envelope verbatim, preserving its correlation
    /// id and retry count. For manual/administrative retry; the automatic
    /// retry path lives in the consumer.
    pub async fn requeue(&self, message: &SyncMessage) -> Result<(), QueueError> {
        let channel = self.settings.channel_for(message.task_type);
        self.broker.publish(channel, message).await?;

        debug!(
            task_id = %message.task_id,
            channel,
            retry_count = message.retry_count,
            correlation_id = %message.correlation_id,
            "Sync message requeued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryBroker;
    use crate::tasks::{SyncTask, SyncTaskType};
    use uuid::Uuid;

    fn producer() -> (SyncQueueProducer, Arc<InMemoryBroker>) {
        let settings = QueueSettings::default();
        let broker = Arc::new(InMemoryBroker::new(settings.dead_letter_channel.clone()));
        (
            SyncQueueProducer::new(broker.clone(), settings),
            broker,
        )
    }

    #[tokio::test]
    async fn routes_each_task_type_to_its_channel() {
        let (producer, broker) = producer();
        let tenant = Uuid::new_v4();

        for (task_type, channel) in [
            (SyncTaskType::Orders, "sync.orders"),
            (SyncTaskType::Returns, "sync.orders"),
            (SyncTaskType::Products, "sync.products"),
            (SyncTaskType::All, "sync.products"),
            (SyncTaskType::Financial, "sync.financial"),
        ] {
            let task = SyncTask::new(tenant, task_type);
            producer.enqueue(&task).await.unwrap();

            let delivery = broker.receive(channel).await.unwrap().unwrap_or_else(|| {
                panic!("{task_type} should route to {channel}")
            });
            assert_eq!(delivery.message.task_id, task.id);
            broker.ack(&delivery).await.unwrap();
        }
    }

    #[tokio::test]
    async fn enqueue_generates_fresh_correlation_ids() {
        let (producer, _broker) = producer();
        let task = SyncTask::new(Uuid::new_v4(), SyncTaskType::Orders);

        let first = producer.enqueue(&task).await.unwrap();
        let second = producer.enqueue(&task).await.unwrap();
        assert_ne!(first.correlation_id, second.correlation_id);
        assert_eq!(first.retry_count, 0);
    }

    #[tokio::test]
    async fn requeue_preserves_envelope() {
        let (producer, broker) = producer();
        let task = SyncTask::new(Uuid::new_v4(), SyncTaskType::Financial);

        let original = producer.enqueue(&task).await.unwrap();
        let delivery = broker.receive("sync.financial").await.unwrap().unwrap();
        broker.ack(&delivery).await.unwrap();

        let retried = original.with_incremented_retry();
        producer.requeue(&retried).await.unwrap();

        let redelivered = broker.receive("sync.financial").await.unwrap().unwrap();
        assert_eq!(redelivered.message.retry_count, 1);
        assert_eq!(redelivered.message.correlation_id, original.correlation_id);
    }
}
