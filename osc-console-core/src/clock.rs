//! Monotonic time sources for the replay engine.
//!
//! The player never reads `Instant` directly so that tests can drive virtual
//! time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic wall clock, in seconds from an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Real time, measured from construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for tests. Time only moves on `advance`/`set`.
///
/// Stores the f64 as raw bits so it can be shared across threads lock-free.
#[derive(Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);
        clock.advance(1.5);
        clock.advance(0.25);
        assert_eq!(clock.now(), 1.75);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
