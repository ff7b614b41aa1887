//! # Resilience Gateway
//!
//! Every outbound marketplace call runs through an explicit, ordered chain
//! of protections: bulkhead → timeout (async variant) → circuit breaker →
//! rate limiter → retry. Each layer is an independently testable component;
//! this module only composes them and maps their rejections into
//! [`ResilienceError`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::config::GatewaySettings;
use crate::resilience::retry::RetryError;
use crate::resilience::{
    ApiCallError, Bulkhead, CircuitBreakerRegistry, ResilienceError, RetryPolicy,
    TenantRateLimiter,
};

/// Resource group for single API requests.
pub const API_GROUP: &str = "marketplace-api";
/// Resource group for long-running sync operations.
pub const SYNC_GROUP: &str = "marketplace-sync";

/// How the rate-limit layer treats an empty bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateMode {
    /// Wait for a permit; used by sync operations, which tolerate delay.
    Block,
    /// Reject immediately with a suggested backoff; used by API calls.
    Reject,
}

/// Handle to an in-flight async API call. Await it for the result, or
/// `abort()` to cancel the underlying operation.
#[derive(Debug)]
pub struct AsyncCall<T> {
    handle: JoinHandle<Result<T, ResilienceError>>,
}

impl<T> AsyncCall<T> {
    /// Cancel the in-flight call. Awaiting afterwards yields an error.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl<T> Future for AsyncCall<T> {
    type Output = Result<T, ResilienceError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().handle)
            .poll(cx)
            .map(|joined| match joined {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(ResilienceError::Other {
                    source: ApiCallError::other("async call aborted"),
                }),
                Err(err) => Err(ResilienceError::Other {
                    source: ApiCallError::other(format!("async call panicked: {err}")),
                }),
            })
    }
}

/// Gateway composing the protection chain for three call shapes:
/// [`execute_api_call`](Self::execute_api_call) for single requests,
/// [`execute_sync_operation`](Self::execute_sync_operation) for long-running
/// batch work, and [`execute_async_api_call`](Self::execute_async_api_call)
/// which returns an [`AsyncCall`] handle immediately.
#[derive(Clone)]
pub struct ResilienceGateway {
    rate_limiter: Arc<TenantRateLimiter>,
    breakers: CircuitBreakerRegistry,
    api_bulkhead: Arc<Bulkhead>,
    sync_bulkhead: Arc<Bulkhead>,
    async_bulkhead: Arc<Bulkhead>,
    api_retry: RetryPolicy,
    sync_retry: RetryPolicy,
    async_call_timeout: Duration,
}

impl ResilienceGateway {
    /// Build a gateway whose breaker registry is derived from the settings.
    pub fn new(settings: &GatewaySettings, rate_limiter: Arc<TenantRateLimiter>) -> Self {
        let breakers = CircuitBreakerRegistry::new(settings.api.circuit_config())
            .with_group_config(API_GROUP, settings.api.circuit_config())
            .with_group_config(SYNC_GROUP, settings.sync.circuit_config());
        Self::with_registry(settings, rate_limiter, breakers)
    }

    /// Build a gateway around an externally constructed breaker registry,
    /// e.g. one shared with a health probe.
    pub fn with_registry(
        settings: &GatewaySettings,
        rate_limiter: Arc<TenantRateLimiter>,
        breakers: CircuitBreakerRegistry,
    ) -> Self {
        Self {
            rate_limiter,
            breakers,
            api_bulkhead: Arc::new(Bulkhead::new(
                "marketplace-api",
                settings.api.bulkhead_max_concurrent,
            )),
            sync_bulkhead: Arc::new(Bulkhead::new(
                "marketplace-sync",
                settings.sync.bulkhead_max_concurrent,
            )),
            async_bulkhead: Arc::new(Bulkhead::new(
                "marketplace-api-async",
                settings.async_bulkhead_max_concurrent,
            )),
            api_retry: settings.api.retry_policy(),
            sync_retry: settings.sync.retry_policy(),
            async_call_timeout: settings.async_call_timeout(),
        }
    }

    pub fn rate_limiter(&self) -> Arc<TenantRateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    pub fn breakers(&self) -> CircuitBreakerRegistry {
        self.breakers.clone()
    }

    /// Execute a single API request under the full protection chain. The
    /// synchronous path waits for a rate permit; only the async variant uses
    /// the rejecting path.
    pub async fn execute_api_call<T, F, Fut>(
        &self,
        tenant_id: Uuid,
        operation: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiCallError>>,
    {
        let _permit = self
            .api_bulkhead
            .try_acquire()
            .ok_or_else(|| Self::bulkhead_full(&self.api_bulkhead))?;

        self.protected(tenant_id, API_GROUP, &self.api_retry, RateMode::Block, operation)
            .await
    }

    /// Execute a long-running sync operation: separate bulkhead, relaxed
    /// circuit breaker, blocking rate acquisition and a larger retry budget.
    pub async fn execute_sync_operation<T, F, Fut>(
        &self,
        tenant_id: Uuid,
        operation: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiCallError>>,
    {
        let _permit = self
            .sync_bulkhead
            .try_acquire()
            .ok_or_else(|| Self::bulkhead_full(&self.sync_bulkhead))?;

        self.protected(tenant_id, SYNC_GROUP, &self.sync_retry, RateMode::Block, operation)
            .await
    }

    /// Start an API call on the async bulkhead and return immediately. The
    /// call is bounded by the configured deadline; a timeout cancels the
    /// in-flight operation and counts as a failure for the circuit breaker.
    /// An empty rate bucket rejects with a suggested backoff instead of
    /// parking the task.
    pub fn execute_async_api_call<T, F, Fut>(&self, tenant_id: Uuid, operation: F) -> AsyncCall<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiCallError>> + Send,
    {
        let gateway = self.clone();
        let deadline = self.async_call_timeout;

        let handle = tokio::spawn(async move {
            let _permit = gateway
                .async_bulkhead
                .try_acquire()
                .ok_or_else(|| Self::bulkhead_full(&gateway.async_bulkhead))?;

            let protected = gateway.protected(
                tenant_id,
                API_GROUP,
                &gateway.api_retry,
                RateMode::Reject,
                operation,
            );
            match tokio::time::timeout(deadline, protected).await {
                Ok(result) => result,
                Err(_) => {
                    // The dropped future cannot record its own outcome; the
                    // timeout counts as a failure so the window stays honest
                    // and a claimed half-open probe slot is released.
                    let breaker = gateway.breakers.get(API_GROUP).await;
                    breaker.record_failure().await;
                    Err(ResilienceError::Timeout { deadline })
                }
            }
        });

        AsyncCall { handle }
    }

    /// Circuit breaker → rate limiter → retry, with the breaker recording
    /// one outcome per protected call (the retried result).
    async fn protected<T, F, Fut>(
        &self,
        tenant_id: Uuid,
        group: &str,
        retry: &RetryPolicy,
        rate_mode: RateMode,
        operation: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiCallError>>,
    {
        let breaker = self.breakers.get(group).await;
        if !breaker.should_allow().await {
            return Err(ResilienceError::CircuitOpen {
                group: group.to_string(),
                retry_after: breaker.remaining_cooldown().await,
            });
        }

        match rate_mode {
            RateMode::Block => {
                let waited = self.rate_limiter.acquire(tenant_id).await;
                if waited > Duration::ZERO {
                    debug!(tenant_id = %tenant_id, waited_ms = waited.as_millis() as u64, group, "Waited for rate permit");
                }
            }
            RateMode::Reject => {
                if !self.rate_limiter.try_acquire(tenant_id) {
                    // Rejection happens before the operation runs, so the
                    // claimed probe slot (if any) must be handed back.
                    breaker.release_probe().await;
                    return Err(ResilienceError::RateLimitExceeded {
                        tenant_id,
                        rate: self.rate_limiter.rate(),
                        retry_after: self.rate_limiter.refill_interval(),
                    });
                }
            }
        }

        let outcome = retry.execute(operation).await;
        match outcome {
            Ok(value) => {
                breaker.record_success().await;
                Ok(value)
            }
            Err(retry_err) => {
                breaker.record_failure().await;
                Err(Self::map_retry_error(retry_err))
            }
        }
    }

    fn map_retry_error(err: RetryError) -> ResilienceError {
        match err {
            RetryError::NotRetryable(source @ ApiCallError::Auth { .. }) => {
                ResilienceError::AuthError { source }
            }
            RetryError::NotRetryable(source) => ResilienceError::Other { source },
            RetryError::Exhausted { attempts, last } => ResilienceError::RetryExhausted {
                attempts,
                source: last,
            },
        }
    }

    fn bulkhead_full(bulkhead: &Bulkhead) -> ResilienceError {
        ResilienceError::BulkheadFull {
            name: bulkhead.name().to_string(),
            max_concurrent: bulkhead.max_concurrent(),
            retry_after: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewaySettings, ProtectionSettings};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::oneshot;

    fn settings() -> GatewaySettings {
        GatewaySettings {
            api: ProtectionSettings {
                bulkhead_max_concurrent: 2,
                sliding_window_size: 2,
                failure_rate_threshold: 0.5,
                cooldown_seconds: 30,
                retry_max_attempts: 3,
                retry_base_delay_ms: 1,
            },
            sync: ProtectionSettings {
                bulkhead_max_concurrent: 2,
                sliding_window_size: 4,
                failure_rate_threshold: 0.5,
                cooldown_seconds: 30,
                retry_max_attempts: 2,
                retry_base_delay_ms: 1,
            },
            async_bulkhead_max_concurrent: 1,
            async_call_timeout_seconds: 1,
        }
    }

    fn gateway_with_rate(rate: u32, burst: u32) -> ResilienceGateway {
        ResilienceGateway::new(&settings(), Arc::new(TenantRateLimiter::new(rate, burst)))
    }

    #[tokio::test]
    async fn successful_call_passes_through() {
        let gateway = gateway_with_rate(100, 100);
        let result = gateway
            .execute_api_call(Uuid::new_v4(), || async { Ok::<_, ApiCallError>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn async_call_rejects_when_rate_exhausted() {
        let gateway = gateway_with_rate(1, 1);
        let tenant = Uuid::new_v4();

        // Drain the single permit.
        gateway.rate_limiter().try_acquire(tenant);

        let call = gateway.execute_async_api_call(tenant, || async { Ok::<_, ApiCallError>(()) });
        match call.await {
            Err(ResilienceError::RateLimitExceeded { rate, retry_after, .. }) => {
                assert_eq!(rate, 1);
                assert_eq!(retry_after, Duration::from_secs(1));
            }
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sync_paths_wait_for_rate_permit() {
        let gateway = gateway_with_rate(50, 1);
        let tenant = Uuid::new_v4();

        // Drain the permit, then both synchronous paths must wait for the
        // next refill interval instead of rejecting.
        gateway.rate_limiter().try_acquire(tenant);

        let started = std::time::Instant::now();
        let result = gateway
            .execute_sync_operation(tenant, || async { Ok::<_, ApiCallError>("done") })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert!(started.elapsed() >= Duration::from_millis(15));

        let started = std::time::Instant::now();
        let result = gateway
            .execute_api_call(tenant, || async { Ok::<_, ApiCallError>("done") })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn circuit_opens_and_fails_fast() {
        let gateway = gateway_with_rate(1000, 1000);
        let tenant = Uuid::new_v4();

        // Two exhausted calls fill the window (size 2) with failures.
        for _ in 0..2 {
            let result: Result<(), _> = gateway
                .execute_api_call(tenant, || async {
                    Err(ApiCallError::server(500, "broken"))
                })
                .await;
            assert!(matches!(
                result,
                Err(ResilienceError::RetryExhausted { attempts: 3, .. })
            ));
        }

        let invoked = AtomicU32::new(0);
        let result = gateway
            .execute_api_call(tenant, || {
                invoked.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ApiCallError>(()) }
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auth_error_skips_retry() {
        let gateway = gateway_with_rate(1000, 1000);
        let invoked = AtomicU32::new(0);

        let result: Result<(), _> = gateway
            .execute_api_call(Uuid::new_v4(), || {
                invoked.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiCallError::auth(401, "expired")) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::AuthError { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sync_bulkhead_fails_fast_at_capacity() {
        let gateway = gateway_with_rate(1000, 1000);
        let tenant = Uuid::new_v4();

        // Park two sync operations on the bulkhead (capacity 2).
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (release_tx2, release_rx2) = oneshot::channel::<()>();
        let g1 = gateway.clone();
        let g2 = gateway.clone();

        let h1 = tokio::spawn(async move {
            let mut rx = Some(release_rx);
            g1.execute_sync_operation(tenant, move || {
                let rx = rx.take();
                async move {
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Ok::<_, ApiCallError>(())
                }
            })
            .await
        });
        let h2 = tokio::spawn(async move {
            let mut rx = Some(release_rx2);
            g2.execute_sync_operation(tenant, move || {
                let rx = rx.take();
                async move {
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Ok::<_, ApiCallError>(())
                }
            })
            .await
        });

        // Give the spawned calls time to claim their slots.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = gateway
            .execute_sync_operation(tenant, || async { Ok::<_, ApiCallError>(()) })
            .await;
        assert!(matches!(
            result,
            Err(ResilienceError::BulkheadFull { max_concurrent: 2, .. })
        ));

        release_tx.send(()).unwrap();
        release_tx2.send(()).unwrap();
        h1.await.unwrap().unwrap();
        h2.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn async_call_returns_handle_immediately() {
        let gateway = gateway_with_rate(1000, 1000);

        let call = gateway.execute_async_api_call(Uuid::new_v4(), || async {
            Ok::<_, ApiCallError>("async result")
        });
        assert_eq!(call.await.unwrap(), "async result");
    }

    #[tokio::test]
    async fn async_call_times_out() {
        let gateway = gateway_with_rate(1000, 1000);

        let call = gateway.execute_async_api_call(Uuid::new_v4(), || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ApiCallError>(())
        });
        let result = call.await;
        assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
    }

    #[tokio::test]
    async fn async_call_can_be_aborted() {
        let gateway = gateway_with_rate(1000, 1000);

        let call = gateway.execute_async_api_call(Uuid::new_v4(), || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ApiCallError>(())
        });
        call.abort();
        let result = call.await;
        assert!(matches!(result, Err(ResilienceError::Other { .. })));
    }
}
