//! # Broker Abstraction
//!
//! Narrow transport seam: publish, receive, acknowledge, reject. Rejecting
//! without requeue routes the message to the configured dead-letter channel,
//! which is all the pipeline needs from any mainstream broker. Consumers
//! bound their own concurrency by the number of workers polling `receive`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::queue::{QueueError, SyncMessage};

/// One received message plus the receipt needed to settle it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub channel: String,
    /// Broker-assigned receipt for ack/reject.
    pub receipt: i64,
    pub message: SyncMessage,
}

/// Message transport seam.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Create the channel (and its dead-letter route) if missing.
    async fn ensure_channel(&self, channel: &str) -> Result<(), QueueError>;

    /// Publish an envelope. Fire-and-forget from the caller's perspective;
    /// returns the broker's message id.
    async fn publish(&self, channel: &str, message: &SyncMessage) -> Result<i64, QueueError>;

    /// Receive the next available message, or `None` when the channel is
    /// empty. A received message stays invisible to other workers until
    /// settled or its visibility window lapses.
    async fn receive(&self, channel: &str) -> Result<Option<Delivery>, QueueError>;

    /// Settle a delivery as processed.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Settle a delivery as failed. With `requeue` the message returns to
    /// its channel; without, it lands on the dead-letter channel.
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;
}

#[derive(Default)]
struct ChannelQueues {
    ready: HashMap<String, VecDeque<(i64, SyncMessage)>>,
    in_flight: HashMap<i64, (String, SyncMessage)>,
}

/// Channel-per-queue in-memory broker for tests and embedded deployments.
pub struct InMemoryBroker {
    queues: Mutex<ChannelQueues>,
    next_id: AtomicI64,
    dead_letter_channel: String,
}

impl InMemoryBroker {
    pub fn new(dead_letter_channel: impl Into<String>) -> Self {
        Self {
            queues: Mutex::new(ChannelQueues::default()),
            next_id: AtomicI64::new(1),
            dead_letter_channel: dead_letter_channel.into(),
        }
    }

    /// Messages currently waiting on a channel.
    pub async fn depth(&self, channel: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.ready.get(channel).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn ensure_channel(&self, channel: &str) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        queues.ready.entry(channel.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &SyncMessage) -> Result<i64, QueueError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut queues = self.queues.lock().await;
        queues
            .ready
            .entry(channel.to_string())
            .or_default()
            .push_back((id, message.clone()));
        debug!(channel, message_id = id, task_id = %message.task_id, "Message published");
        Ok(id)
    }

    async fn receive(&self, channel: &str) -> Result<Option<Delivery>, QueueError> {
        let mut queues = self.queues.lock().await;
        let next = queues
            .ready
            .get_mut(channel)
            .and_then(VecDeque::pop_front);

        match next {
            Some((id, message)) => {
                queues
                    .in_flight
                    .insert(id, (channel.to_string(), message.clone()));
                Ok(Some(Delivery {
                    channel: channel.to_string(),
                    receipt: id,
                    message,
                }))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        queues.in_flight.remove(&delivery.receipt);
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        let Some((channel, message)) = queues.in_flight.remove(&delivery.receipt) else {
            return Err(QueueError::broker_operation(
                &delivery.channel,
                "reject",
                format!("unknown receipt {}", delivery.receipt),
            ));
        };

        let target = if requeue {
            channel
        } else {
            debug!(
                channel = %delivery.channel,
                task_id = %message.task_id,
                "Message rejected without requeue, routing to dead letter channel"
            );
            self.dead_letter_channel.clone()
        };
        queues
            .ready
            .entry(target)
            .or_default()
            .push_back((delivery.receipt, message));
        Ok(())
    }
}
