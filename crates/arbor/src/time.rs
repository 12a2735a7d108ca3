//! Clock sources for the engine.
//!
//! The engine never calls `Instant::now()` directly. It asks a
//! [`TimeProvider`], so tests (and replays) can drive time by hand with
//! [`ManualTime`].

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic seconds from an arbitrary origin.
pub trait TimeProvider {
    fn now_secs(&self) -> f64;
}

/// Wall-clock time via `Instant`, measured from when the provider was made.
pub struct StdTimeProvider {
    origin: Instant,
}

impl StdTimeProvider {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for StdTimeProvider {
    fn now_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualTime {
    now: Rc<Cell<f64>>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, secs: f64) {
        self.now.set(secs);
    }

    pub fn advance(&self, secs: f64) {
        self.now.set(self.now.get() + secs);
    }
}

impl TimeProvider for ManualTime {
    fn now_secs(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_time_is_shared_between_clones() {
        let clock = ManualTime::new();
        let handle = clock.clone();
        handle.advance(0.5);
        handle.advance(0.25);
        assert_eq!(clock.now_secs(), 0.75);
        clock.set(10.0);
        assert_eq!(handle.now_secs(), 10.0);
    }

    #[test]
    fn std_time_is_monotonic() {
        let clock = StdTimeProvider::new();
        let a = clock.now_secs();
        let b = clock.now_secs();
        assert!(b >= a);
        assert!(a >= 0.0);
    }
}
