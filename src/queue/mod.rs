//! # Task Queue
//!
//! Asynchronous sync pipeline: producer routing task envelopes onto the
//! transport, per-channel consumer worker pools, and the dead-letter path
//! for messages that exhausted their retry budget. The broker is a narrow
//! trait so the pipeline runs unchanged on pgmq or the in-memory transport.

pub mod broker;
pub mod consumer;
pub mod errors;
pub mod message;
pub mod pgmq_broker;
pub mod producer;

pub use broker::{Broker, Delivery, InMemoryBroker};
pub use consumer::{ConsumerPool, SyncQueueConsumer};
pub use errors::{QueueError, QueueResult};
pub use message::{SyncMessage, CONTENT_TYPE};
pub use pgmq_broker::PgmqBroker;
pub use producer::SyncQueueProducer;
