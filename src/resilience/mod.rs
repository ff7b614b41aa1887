//! # Resilience Module
//!
//! Protection chain for outbound marketplace calls: per-tenant rate
//! limiting, sliding-window circuit breaking, bulkheading and classified
//! retry, composed by the [`ResilienceGateway`] in the documented
//! outer-to-inner order (bulkhead → timeout → circuit breaker → rate
//! limiter → retry). Each layer is constructed once and injected, so every
//! piece is independently testable.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod error;
pub mod gateway;
pub mod health;
pub mod http;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerSnapshot,
    CircuitState,
};
pub use error::{ApiCallError, ResilienceError};
pub use gateway::{AsyncCall, ResilienceGateway, API_GROUP, SYNC_GROUP};
pub use health::{HealthProbe, HealthReport, HealthVerdict};
pub use http::HttpApiClient;
pub use rate_limiter::TenantRateLimiter;
pub use registry::CircuitBreakerRegistry;
pub use retry::{RetryError, RetryPolicy};
