//! # Per-Tenant Rate Limiter
//!
//! One independent token bucket per tenant, created lazily on first use.
//! Buckets refill continuously at the configured permits/second; the hot path
//! is atomic CAS only, no locks shared across tenants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Token scale factor: buckets count millitokens so refill arithmetic stays
/// integral at sub-token granularity.
const TOKEN_SCALE: u64 = 1000;

/// A single tenant's token bucket. Refilled on demand from elapsed time.
#[derive(Debug)]
struct TenantBucket {
    /// Bucket capacity in scaled tokens.
    capacity: u64,
    /// Nanoseconds between single-token refills.
    refill_nanos: u64,
    /// Current scaled token count.
    tokens: AtomicU64,
    /// Elapsed-nanos mark of the last refill.
    last_refill: AtomicU64,
}

impl TenantBucket {
    fn new(rate: u32, burst: u32, now_nanos: u64) -> Self {
        let refill_nanos = if rate == 0 {
            u64::MAX
        } else {
            1_000_000_000 / u64::from(rate)
        };
        let capacity = u64::from(burst).saturating_mul(TOKEN_SCALE);

        Self {
            capacity,
            refill_nanos,
            tokens: AtomicU64::new(capacity),
            last_refill: AtomicU64::new(now_nanos),
        }
    }

    /// Try to consume one token. Lock-free; loses a CAS race only to another
    /// caller for the same tenant.
    fn try_acquire(&self, now_nanos: u64) -> bool {
        self.refill(now_nanos);

        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current < TOKEN_SCALE {
                return false;
            }
            if self
                .tokens
                .compare_exchange_weak(
                    current,
                    current - TOKEN_SCALE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Whether a permit is obtainable right now, without consuming one.
    fn peek(&self, now_nanos: u64) -> bool {
        self.refill(now_nanos);
        self.tokens.load(Ordering::Acquire) >= TOKEN_SCALE
    }

    /// Nanoseconds until the next whole token becomes available.
    fn next_permit_nanos(&self, now_nanos: u64) -> u64 {
        let last = self.last_refill.load(Ordering::Acquire);
        let elapsed = now_nanos.saturating_sub(last);
        self.refill_nanos.saturating_sub(elapsed).max(1)
    }

    /// Credit tokens for the time elapsed since the last refill. A CAS on
    /// `last_refill` elects a single refiller per interval.
    fn refill(&self, now_nanos: u64) {
        loop {
            let last = self.last_refill.load(Ordering::Acquire);
            let elapsed = now_nanos.saturating_sub(last);

            if elapsed < self.refill_nanos {
                return;
            }

            let intervals = elapsed / self.refill_nanos;
            let new_last = last + intervals * self.refill_nanos;

            match self.last_refill.compare_exchange_weak(
                last,
                new_last,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let add = intervals.saturating_mul(TOKEN_SCALE);
                    loop {
                        let current = self.tokens.load(Ordering::Acquire);
                        let next = current.saturating_add(add).min(self.capacity);
                        if current == next {
                            return;
                        }
                        if self
                            .tokens
                            .compare_exchange_weak(
                                current,
                                next,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                        {
                            return;
                        }
                    }
                }
                Err(_) => continue,
            }
        }
    }
}

/// Rate limiter maintaining one bucket per tenant.
///
/// Bucket creation is atomic on first use: concurrent first access for the
/// same tenant resolves to a single bucket through the map's entry API.
/// This component never fails; it only waits or reports a boolean.
#[derive(Debug)]
pub struct TenantRateLimiter {
    buckets: DashMap<Uuid, TenantBucket>,
    permits_per_second: u32,
    burst: u32,
    epoch: Instant,
}

impl TenantRateLimiter {
    /// Create a limiter granting `permits_per_second` to every tenant, with a
    /// burst capacity of `burst` permits.
    pub fn new(permits_per_second: u32, burst: u32) -> Self {
        info!(
            permits_per_second,
            burst, "Tenant rate limiter initialized"
        );
        Self {
            buckets: DashMap::new(),
            permits_per_second,
            burst: burst.max(1),
            epoch: Instant::now(),
        }
    }

    /// Configured permits/second (uniform across tenants).
    pub fn rate(&self) -> u32 {
        self.permits_per_second
    }

    /// Acquire a permit for `tenant_id`, waiting as long as necessary.
    /// Returns how long the caller waited.
    pub async fn acquire(&self, tenant_id: Uuid) -> Duration {
        let started = Instant::now();
        loop {
            let now = self.now_nanos();
            let wait_nanos = {
                let bucket = self.bucket(tenant_id, now);
                if bucket.try_acquire(now) {
                    break;
                }
                bucket.next_permit_nanos(now)
            };
            tokio::time::sleep(Duration::from_nanos(wait_nanos)).await;
        }

        let waited = started.elapsed();
        if waited > Duration::ZERO {
            debug!(tenant_id = %tenant_id, waited_ms = waited.as_millis() as u64, "Rate limit wait");
        }
        waited
    }

    /// Try to acquire a permit without waiting.
    pub fn try_acquire(&self, tenant_id: Uuid) -> bool {
        let now = self.now_nanos();
        self.bucket(tenant_id, now).try_acquire(now)
    }

    /// Whether a permit is currently obtainable for `tenant_id` without
    /// consuming one. Used by the health probe.
    pub fn permit_available(&self, tenant_id: Uuid) -> bool {
        let now = self.now_nanos();
        self.bucket(tenant_id, now).peek(now)
    }

    /// Interval between single-permit refills; the suggested backoff for a
    /// rejected caller.
    pub fn refill_interval(&self) -> Duration {
        if self.permits_per_second == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_nanos(1_000_000_000 / u64::from(self.permits_per_second))
        }
    }

    /// Free the bucket for a deactivated tenant. Bounds memory; a later call
    /// for the same tenant recreates the bucket fresh.
    pub fn remove(&self, tenant_id: Uuid) {
        if self.buckets.remove(&tenant_id).is_some() {
            debug!(tenant_id = %tenant_id, "Rate bucket removed");
        }
    }

    /// Number of live buckets.
    pub fn tenant_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket(
        &self,
        tenant_id: Uuid,
        now_nanos: u64,
    ) -> dashmap::mapref::one::Ref<'_, Uuid, TenantBucket> {
        if let Some(bucket) = self.buckets.get(&tenant_id) {
            return bucket;
        }
        self.buckets
            .entry(tenant_id)
            .or_insert_with(|| {
                debug!(tenant_id = %tenant_id, rate = self.permits_per_second, "Rate bucket created");
                TenantBucket::new(self.permits_per_second, self.burst, now_nanos)
            })
            .downgrade()
    }

    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}
