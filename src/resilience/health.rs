//! # Health Probe
//!
//! Read-only view over the rate limiter and circuit breakers for liveness
//! checks: the configured rate, whether a permit is obtainable without
//! blocking, every breaker's state, and an overall verdict.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resilience::{CircuitBreakerRegistry, CircuitBreakerSnapshot, CircuitState, TenantRateLimiter};

/// Overall verdict for load balancers and orchestrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Up,
    Degraded,
    Down,
}

/// Snapshot returned by [`HealthProbe::report`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Configured permits/second per tenant.
    pub rate_limit_per_second: u32,
    /// Whether the sentinel tenant could obtain a permit right now.
    pub permit_available: bool,
    pub circuits: Vec<CircuitBreakerSnapshot>,
    pub verdict: HealthVerdict,
}

/// Probe over the gateway's shared protection state. Never mutates it; the
/// permit check peeks without consuming.
#[derive(Clone)]
pub struct HealthProbe {
    rate_limiter: Arc<TenantRateLimiter>,
    breakers: CircuitBreakerRegistry,
    /// Tenant id used for the non-consuming permit check.
    sentinel_tenant: Uuid,
}

impl HealthProbe {
    pub fn new(rate_limiter: Arc<TenantRateLimiter>, breakers: CircuitBreakerRegistry) -> Self {
        Self {
            rate_limiter,
            breakers,
            sentinel_tenant: Uuid::nil(),
        }
    }

    pub async fn report(&self) -> HealthReport {
        let permit_available = self.rate_limiter.permit_available(self.sentinel_tenant);
        let circuits = self.breakers.snapshots().await;

        let any_open = circuits.iter().any(|c| c.state == CircuitState::Open);
        let any_half_open = circuits.iter().any(|c| c.state == CircuitState::HalfOpen);

        let verdict = if any_open {
            HealthVerdict::Down
        } else if any_half_open || !permit_available {
            HealthVerdict::Degraded
        } else {
            HealthVerdict::Up
        };

        HealthReport {
            rate_limit_per_second: self.rate_limiter.rate(),
            permit_available,
            circuits,
            verdict,
        }
    }
}
