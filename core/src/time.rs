//! Deadlines for hardware polling
//!
//! There is no global clock here. Whoever builds a deadline passes in a
//! millisecond time source, so the same polling code runs against a
//! firmware timer on hardware and against a fake clock in tests.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::{BootError, Result};

/// Millisecond time source
pub type TimeSource = fn() -> u64;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Fallback time source: advances one millisecond per call.
///
/// Guarantees any deadline eventually expires, even on boards that never
/// install a real timer.
pub fn tick_clock() -> u64 {
    TICKS.fetch_add(1, Ordering::Relaxed)
}

/// Point in time after which a wait is abandoned
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    clock: TimeSource,
    expires_at: u64,
}

impl Deadline {
    /// Deadline `timeout_ms` from now on `clock`
    pub fn after(clock: TimeSource, timeout_ms: u64) -> Self {
        Self {
            clock,
            expires_at: clock().saturating_add(timeout_ms),
        }
    }

    pub fn expired(&self) -> bool {
        (self.clock)() >= self.expires_at
    }

    /// Milliseconds left, zero once expired
    pub fn remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub((self.clock)())
    }
}

/// Poll `ready` until it reports true or the deadline passes.
///
/// `ready` is always called at least once. Errors from `ready` abort the
/// wait immediately. Returns `BootError::Timeout` on expiry; the caller is
/// responsible for putting the hardware back into a known state.
pub fn poll_until<F>(deadline: &Deadline, mut ready: F) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    loop {
        if ready()? {
            return Ok(());
        }
        if deadline.expired() {
            return Err(BootError::Timeout);
        }
        core::hint::spin_loop();
    }
}
