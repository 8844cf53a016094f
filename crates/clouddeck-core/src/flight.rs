//! Single-flight markers.
//!
//! A [`Flight`] admits at most one outstanding call of its category. The
//! returned [`FlightGuard`] releases the slot when dropped, which also covers
//! futures that are dropped mid-await when their task is aborted.

use std::sync::atomic::{AtomicBool, Ordering};

/// At-most-one-outstanding-call marker for one operation category.
#[derive(Debug, Default)]
pub struct Flight {
    busy: AtomicBool,
}

impl Flight {
    /// Create an idle flight.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Claim the slot, or return `None` if a call is already outstanding.
    #[must_use]
    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flight: self })
    }

    /// Returns `true` while a call is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases its [`Flight`] on drop.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flight: &'a Flight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}
