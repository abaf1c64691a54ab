// Microsecond time source for the control loop
//
// Timestamps are u32 microseconds that wrap around; all elapsed-time math
// uses wrapping subtraction.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Current time in microseconds (wrapping)
    fn now_us(&self) -> u32;
}

/// Wall clock based on `Instant`, counting from construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u32 {
        self.start.elapsed().as_micros() as u32
    }
}

/// Clock advanced by hand, for simulation and tests.
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start_us: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start_us)),
        }
    }

    pub fn advance(&self, us: u32) {
        let now = self.now.load(Ordering::Relaxed);
        self.now.store(now.wrapping_add(us), Ordering::Relaxed);
    }

    pub fn set(&self, us: u32) {
        self.now.store(us, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(10);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.now_us(), 15);
    }

    #[test]
    fn test_manual_clock_wraps() {
        let clock = ManualClock::new(u32::MAX);
        clock.advance(2);
        assert_eq!(clock.now_us(), 1);
    }
}
