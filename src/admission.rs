//! Admission control for generation requests.
//!
//! Generation is accelerator-bound and memory-heavy; unbounded concurrency
//! against one resident model collapses latency for everyone. The
//! [`AdmissionController`] is the single chokepoint enforcing the configured
//! ceiling no matter how many transport-level requests arrive at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::GatewayError;

/// Bounds concurrent generation requests system-wide.
///
/// Waiters queue in FIFO order (tokio's semaphore hands permits out in
/// arrival order). Acquisition is bounded by a caller-supplied timeout.
pub struct AdmissionController {
    permits: Arc<Semaphore>,
    limit: usize,
    waiting: Arc<AtomicUsize>,
}

/// A scoped lease against the concurrency budget.
///
/// Dropping the slot returns capacity. Release-exactly-once is guaranteed by
/// construction: the permit can only be dropped once, and there is no manual
/// release to call twice.
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

/// Decrements the waiter gauge even if the waiting future is cancelled.
struct WaitGuard(Arc<AtomicUsize>);

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionController {
    /// Create a controller with `limit` concurrent slots.
    ///
    /// A zero limit would silently reject every request, which always means
    /// misconfiguration; it is refused here rather than at acquire time.
    pub fn new(limit: usize) -> Result<Self, GatewayError> {
        if limit == 0 {
            return Err(GatewayError::Config(
                "max concurrent requests must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            waiting: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Wait up to `timeout` for a slot.
    ///
    /// A zero timeout degenerates to a non-blocking attempt: if the
    /// controller is saturated the caller gets `ServerBusy` immediately,
    /// without being enqueued.
    pub async fn acquire(&self, timeout: Duration) -> Result<AdmissionSlot, GatewayError> {
        let busy = || GatewayError::ServerBusy {
            waited_ms: timeout.as_millis() as u64,
        };

        if timeout.is_zero() {
            let permit = self
                .permits
                .clone()
                .try_acquire_owned()
                .map_err(|_| busy())?;
            return Ok(AdmissionSlot { _permit: permit });
        }

        self.waiting.fetch_add(1, Ordering::SeqCst);
        let _wait = WaitGuard(self.waiting.clone());

        let acquired = tokio::time::timeout(timeout, self.permits.clone().acquire_owned()).await;
        match acquired {
            Ok(Ok(permit)) => Ok(AdmissionSlot { _permit: permit }),
            // Closed semaphore cannot happen: we never close it.
            Ok(Err(_)) => Err(GatewayError::Internal(
                "admission semaphore closed".to_string(),
            )),
            Err(_) => Err(busy()),
        }
    }

    /// Configured concurrency ceiling.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Number of requests currently queued for a slot.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}
