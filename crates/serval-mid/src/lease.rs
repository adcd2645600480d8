//! Keep-awake lease extended by `AcquireResource` messages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic deadline until which background activity should stay awake.
#[derive(Debug)]
pub(crate) struct ResourceLease {
    epoch: Instant,
    deadline_ms: AtomicU64,
}

impl ResourceLease {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
            deadline_ms: AtomicU64::new(0),
        }
    }

    /// Extends the lease to at least `hold_ms` from now. Non-positive holds are ignored.
    pub(crate) fn extend(&self, hold_ms: i64) {
        let Ok(hold_ms) = u64::try_from(hold_ms) else {
            return;
        };
        let deadline = self.elapsed_ms().saturating_add(hold_ms);
        self.deadline_ms.fetch_max(deadline, Ordering::AcqRel);
    }

    /// Returns `true` while the lease is active.
    pub(crate) fn is_held(&self) -> bool {
        self.elapsed_ms() < self.deadline_ms.load(Ordering::Acquire)
    }

    /// Time left on the lease.
    pub(crate) fn remaining(&self) -> Duration {
        let remaining = self
            .deadline_ms
            .load(Ordering::Acquire)
            .saturating_sub(self.elapsed_ms());
        Duration::from_millis(remaining)
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
