#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # MarketSync Core
//!
//! Resilient outbound gateway and asynchronous synchronization pipeline for
//! multi-tenant marketplace integrations. Many independent seller accounts
//! ("tenants") share one external marketplace API with strict per-second
//! rate limits; this crate throttles and protects every outbound call and
//! moves long-running synchronization work into a durable, retryable,
//! at-least-once task queue with a dead-letter path.
//!
//! ## Architecture
//!
//! - [`resilience`]: per-tenant rate limiting, sliding-window circuit
//!   breakers, bulkheads and classified retry, composed by the
//!   [`ResilienceGateway`](resilience::ResilienceGateway) in a fixed
//!   outer-to-inner order (bulkhead → timeout → circuit breaker → rate
//!   limiter → retry).
//! - [`tasks`]: task records, the Pending → Running → Completed | Failed
//!   state machine, and the store/service pair status pollers consume.
//! - [`queue`]: producer, per-channel consumer worker pools and the
//!   dead-letter consumer over a narrow [`Broker`](queue::Broker) seam
//!   (pgmq-backed or in-memory).
//! - [`executor`]: the [`SyncExecutor`](executor::SyncExecutor) interface
//!   collaborators implement for the actual external-API work.
//! - [`config`]: layered settings (defaults, file, environment).
//!
//! ## Flow
//!
//! A caller creates a task (Pending) and the producer publishes its envelope
//! to the channel for its task type. A consumer worker picks it up, marks it
//! Running and invokes the matching executor through the gateway. Success
//! completes the task with item counters; failure republishes the envelope
//! with its retry count incremented until the budget (3) is spent, after
//! which the message is rejected to the dead-letter channel and the task is
//! marked Failed with the total attempt count.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use marketsync_core::config::MarketSyncConfig;
//! use marketsync_core::executor::ExecutorRegistry;
//! use marketsync_core::queue::{InMemoryBroker, SyncQueueConsumer, SyncQueueProducer};
//! use marketsync_core::resilience::{ResilienceGateway, TenantRateLimiter};
//! use marketsync_core::tasks::{InMemoryTaskStore, SyncTaskService, SyncTaskType};
//! use uuid::Uuid;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = MarketSyncConfig::load()?;
//!
//! let rate_limiter = Arc::new(TenantRateLimiter::new(
//!     config.rate_limiter.permits_per_second,
//!     config.rate_limiter.burst,
//! ));
//! let gateway = Arc::new(ResilienceGateway::new(&config.gateway, rate_limiter));
//! let tasks = SyncTaskService::new(Arc::new(InMemoryTaskStore::new()));
//! let broker = Arc::new(InMemoryBroker::new(config.queue.dead_letter_channel.clone()));
//! let executors = Arc::new(ExecutorRegistry::new());
//!
//! let producer = SyncQueueProducer::new(broker.clone(), config.queue.clone());
//! let consumer = SyncQueueConsumer::new(broker, tasks.clone(), gateway, executors, config.queue);
//!
//! let task = tasks.create_task(Uuid::new_v4(), SyncTaskType::Orders).await?;
//! producer.enqueue(&task).await?;
//! let pool = consumer.start();
//! # pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod queue;
pub mod resilience;
pub mod tasks;

pub use config::MarketSyncConfig;
pub use error::{MarketSyncError, Result};
pub use executor::{ExecutorRegistry, SyncExecutor, SyncOutcome};
pub use queue::{Broker, SyncMessage, SyncQueueConsumer, SyncQueueProducer};
pub use resilience::{
    ApiCallError, HealthProbe, HealthVerdict, ResilienceError, ResilienceGateway,
    TenantRateLimiter,
};
pub use tasks::{SyncTask, SyncTaskService, SyncTaskStatus, SyncTaskType};
