//! # Configuration
//!
//! Typed settings for the rate limiter, gateway protections and queue
//! topology. Values layer from defaults, an optional `config/marketsync`
//! file (TOML/YAML/JSON) and `MARKETSYNC_`-prefixed environment variables,
//! so deployments rebind channels and thresholds without code changes.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use crate::tasks::SyncTaskType;

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Per-tenant rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterSettings {
    /// Permits granted to each tenant per second.
    pub permits_per_second: u32,
    /// Burst capacity per tenant.
    pub burst: u32,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            permits_per_second: 10,
            burst: 10,
        }
    }
}

/// Protection chain settings for one call class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionSettings {
    pub bulkhead_max_concurrent: usize,
    pub sliding_window_size: usize,
    pub failure_rate_threshold: f64,
    pub cooldown_seconds: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl ProtectionSettings {
    /// Defaults for single API requests: tight window, fast retries.
    pub fn api_defaults() -> Self {
        Self {
            bulkhead_max_concurrent: 100,
            sliding_window_size: 10,
            failure_rate_threshold: 0.5,
            cooldown_seconds: 30,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }

    /// Defaults for long-running sync operations: wider window, more
    /// tolerant threshold, longer cooldown.
    pub fn sync_defaults() -> Self {
        Self {
            bulkhead_max_concurrent: 50,
            sliding_window_size: 20,
            failure_rate_threshold: 0.4,
            cooldown_seconds: 60,
            retry_max_attempts: 5,
            retry_base_delay_ms: 1000,
        }
    }

    pub fn circuit_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            sliding_window_size: self.sliding_window_size,
            failure_rate_threshold: self.failure_rate_threshold,
            min_calls: self.sliding_window_size,
            cooldown: Duration::from_secs(self.cooldown_seconds),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self::api_defaults()
    }
}

/// Gateway settings: one protection profile per call class plus the async
/// call bulkhead and deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub api: ProtectionSettings,
    pub sync: ProtectionSettings,
    pub async_bulkhead_max_concurrent: usize,
    pub async_call_timeout_seconds: u64,
}

impl GatewaySettings {
    pub fn async_call_timeout(&self) -> Duration {
        Duration::from_secs(self.async_call_timeout_seconds)
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            api: ProtectionSettings::api_defaults(),
            sync: ProtectionSettings::sync_defaults(),
            async_bulkhead_max_concurrent: 20,
            async_call_timeout_seconds: 30,
        }
    }
}

/// Queue topology and consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub orders_channel: String,
    pub products_channel: String,
    pub financial_channel: String,
    pub dead_letter_channel: String,
    /// Worker-pool size per channel.
    pub orders_concurrency: usize,
    pub products_concurrency: usize,
    pub financial_concurrency: usize,
    /// Message-level retry budget before dead-lettering.
    pub max_retry_attempts: u32,
    /// Idle wait between broker polls.
    pub poll_interval_ms: u64,
    /// How long a received message stays invisible to other workers.
    pub visibility_timeout_seconds: u32,
}

impl QueueSettings {
    /// Routing rule: orders and returns share the orders channel, full syncs
    /// start with products, financial work is isolated on its own channel.
    pub fn channel_for(&self, task_type: SyncTaskType) -> &str {
        match task_type {
            SyncTaskType::Orders | SyncTaskType::Returns => &self.orders_channel,
            SyncTaskType::Products | SyncTaskType::All => &self.products_channel,
            SyncTaskType::Financial => &self.financial_channel,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            orders_channel: "sync.orders".to_string(),
            products_channel: "sync.products".to_string(),
            financial_channel: "sync.financial".to_string(),
            dead_letter_channel: "sync.dlq".to_string(),
            orders_concurrency: 4,
            products_concurrency: 4,
            financial_concurrency: 2,
            max_retry_attempts: 3,
            poll_interval_ms: 250,
            visibility_timeout_seconds: 300,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSyncConfig {
    pub rate_limiter: RateLimiterSettings,
    pub gateway: GatewaySettings,
    pub queue: QueueSettings,
}

impl MarketSyncConfig {
    /// Load configuration: defaults, then the optional `config/marketsync`
    /// file, then `MARKETSYNC_`-prefixed environment variables
    /// (`MARKETSYNC_QUEUE__ORDERS_CONCURRENCY=5`).
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/marketsync").required(false))
            .add_source(Environment::with_prefix("MARKETSYNC").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = MarketSyncConfig::default();

        assert_eq!(config.rate_limiter.permits_per_second, 10);
        assert_eq!(config.gateway.api.retry_max_attempts, 3);
        assert_eq!(config.gateway.sync.retry_max_attempts, 5);
        assert!(config.gateway.sync.failure_rate_threshold < config.gateway.api.failure_rate_threshold);
        assert_eq!(config.queue.max_retry_attempts, 3);
        assert_eq!(config.queue.financial_concurrency, 2);
    }

    #[test]
    fn routing_rule() {
        let queue = QueueSettings::default();

        assert_eq!(queue.channel_for(SyncTaskType::Orders), "sync.orders");
        assert_eq!(queue.channel_for(SyncTaskType::Returns), "sync.orders");
        assert_eq!(queue.channel_for(SyncTaskType::Products), "sync.products");
        assert_eq!(queue.channel_for(SyncTaskType::All), "sync.products");
        assert_eq!(queue.channel_for(SyncTaskType::Financial), "sync.financial");
    }

    #[test]
    fn protection_settings_convert() {
        let settings = ProtectionSettings::sync_defaults();
        let circuit = settings.circuit_config();
        assert_eq!(circuit.sliding_window_size, 20);
        assert_eq!(circuit.cooldown, Duration::from_secs(60));

        let retry = settings.retry_policy();
        assert_eq!(retry.max_attempts(), 5);
    }
}
