//! Pending-write accounting for the writer task.
//!
//! The writer queue itself never refuses a write: the three sub-writes of a
//! chunked body must reach the wire together. What this module bounds is how
//! far producers run ahead of the transport. Every queued write bumps a
//! shared gauge, every flushed (or abandoned) write drops it, and producers
//! await [`PendingWrites::ready`] before generating more output.
//!
//! Waiters park on a [`Notify`] and are woken when a release brings the gauge
//! back under the limit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{FramewireError, Result};

/// Default limit on queued but unflushed writes.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default wait before [`PendingWrites::ready`] gives up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Gauge {
    queued: AtomicUsize,
    drained: Notify,
}

/// Shared gauge of writes queued for a single transport.
///
/// Clones observe the same gauge.
#[derive(Debug, Clone)]
pub struct PendingWrites {
    gauge: Arc<Gauge>,
    limit: usize,
    patience: Duration,
}

impl PendingWrites {
    pub fn new(limit: usize, patience: Duration) -> Self {
        Self {
            gauge: Arc::default(),
            limit,
            patience,
        }
    }

    /// Writes currently queued.
    #[inline]
    pub fn queued(&self) -> usize {
        self.gauge.queued.load(Ordering::Acquire)
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Whether producers should hold off.
    #[inline]
    pub fn is_saturated(&self) -> bool {
        self.queued() >= self.limit
    }

    /// Record `n` newly queued writes.
    #[inline]
    pub fn add(&self, n: usize) {
        self.gauge.queued.fetch_add(n, Ordering::AcqRel);
    }

    /// Record `n` writes leaving the queue, waking waiters once the gauge
    /// drops under the limit.
    pub fn remove(&self, n: usize) {
        let before = self
            .gauge
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |q| {
                Some(q.saturating_sub(n))
            })
            .unwrap_or_else(|q| q);
        if before.saturating_sub(n) < self.limit {
            self.gauge.drained.notify_waiters();
        }
    }

    /// Wait until the gauge is under the limit.
    ///
    /// # Errors
    ///
    /// `BackpressureTimeout` if the queue does not drain within the
    /// configured patience.
    pub async fn ready(&self) -> Result<()> {
        let drained = async {
            loop {
                let mut notified = std::pin::pin!(self.gauge.drained.notified());
                // Register before checking so a release in between is not lost.
                notified.as_mut().enable();
                if !self.is_saturated() {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(self.patience, drained)
            .await
            .map_err(|_| FramewireError::BackpressureTimeout)
    }
}

impl Default for PendingWrites {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING, DEFAULT_TIMEOUT)
    }
}
