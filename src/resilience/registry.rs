//! # Circuit Breaker Registry
//!
//! Get-or-create access to one circuit breaker per resource group. Shared by
//! the gateway and the health probe; breakers for unrelated groups never
//! contend on each other's state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};

/// Registry of circuit breakers keyed by resource group name.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    /// Per-group configuration overrides; anything else gets the default.
    group_configs: HashMap<String, CircuitBreakerConfig>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            group_configs: HashMap::new(),
            default_config,
        }
    }

    /// Register a dedicated configuration for a group before first use.
    pub fn with_group_config(mut self, group: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.group_configs.insert(group.into(), config);
        self
    }

    /// Get or create the breaker for a resource group.
    pub async fn get(&self, group: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(group) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.breakers.write().await;
        // Another task may have created it between the read and write locks.
        if let Some(breaker) = breakers.get(group) {
            return Arc::clone(breaker);
        }

        let config = self
            .group_configs
            .get(group)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());
        let breaker = Arc::new(CircuitBreaker::new(group.to_string(), config));
        breakers.insert(group.to_string(), Arc::clone(&breaker));

        info!(group, total = breakers.len(), "Created circuit breaker");
        breaker
    }

    /// Names of all live groups.
    pub async fn groups(&self) -> Vec<String> {
        let breakers = self.breakers.read().await;
        breakers.keys().cloned().collect()
    }

    /// Snapshots for every live breaker.
    pub async fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers = self.breakers.read().await;
        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers.values() {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots
    }

    /// Count of breakers per state, for monitoring rollups.
    pub async fn state_summary(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for snapshot in self.snapshots().await {
            *counts.entry(snapshot.state).or_insert(0) += 1;
        }
        counts
    }
}

impl Clone for CircuitBreakerRegistry {
    fn clone(&self) -> Self {
        Self {
            breakers: Arc::clone(&self.breakers),
            group_configs: self.group_configs.clone(),
            default_config: self.default_config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn get_or_create_returns_same_instance() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());

        let first = registry.get("marketplace-api").await;
        let second = registry.get("marketplace-api").await;
        assert!(Arc::ptr_eq(&first, &second));

        let groups = registry.groups().await;
        assert_eq!(groups, vec!["marketplace-api".to_string()]);
    }

    #[tokio::test]
    async fn group_config_overrides_default() {
        let relaxed = CircuitBreakerConfig {
            sliding_window_size: 20,
            failure_rate_threshold: 0.4,
            min_calls: 20,
            cooldown: Duration::from_secs(60),
        };
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default())
            .with_group_config("marketplace-sync", relaxed);

        let api = registry.get("marketplace-api").await;
        let sync = registry.get("marketplace-sync").await;
        assert_eq!(api.state(), CircuitState::Closed);
        assert_eq!(sync.state(), CircuitState::Closed);

        let summary = registry.state_summary().await;
        assert_eq!(summary.get(&CircuitState::Closed), Some(&2));
    }
}
