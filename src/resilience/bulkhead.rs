//! # Bulkhead
//!
//! Caps the number of concurrently in-flight calls for one class of work so
//! a slow dependency cannot exhaust shared resources. Exceeding the cap
//! fails fast; callers are never queued.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Concurrency cap for a named class of calls.
#[derive(Debug)]
pub struct Bulkhead {
    name: String,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

/// Occupancy held for the duration of a protected call. Dropping it releases
/// the slot.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        let name = name.into();
        debug!(bulkhead = %name, max_concurrent, "Bulkhead initialized");
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Claim a slot, or `None` if the bulkhead is at capacity.
    pub fn try_acquire(&self) -> Option<BulkheadPermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(BulkheadPermit { _permit: permit }),
            Err(_) => {
                warn!(
                    bulkhead = %self.name,
                    max_concurrent = self.max_concurrent,
                    "Bulkhead full, rejecting call"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_beyond_capacity() {
        let bulkhead = Bulkhead::new("test", 2);

        let a = bulkhead.try_acquire();
        let b = bulkhead.try_acquire();
        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(bulkhead.in_flight(), 2);

        assert!(bulkhead.try_acquire().is_none());
    }

    #[test]
    fn dropping_permit_frees_slot() {
        let bulkhead = Bulkhead::new("test", 1);

        let permit = bulkhead.try_acquire().unwrap();
        assert!(bulkhead.try_acquire().is_none());

        drop(permit);
        assert_eq!(bulkhead.in_flight(), 0);
        assert!(bulkhead.try_acquire().is_some());
    }
}
