use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic clock seam.
///
/// The render path is forbidden from reading wall-clock time; timeouts and
/// log counters go through this trait so tests can drive time manually.
pub trait Clock: Send + Sync {
    /// Monotonic elapsed time since an arbitrary epoch.
    fn monotonic(&self) -> Duration;
}

/// Production clock backed by [`Instant`].
#[derive(Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Create a clock whose epoch is the moment of construction.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn monotonic(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Manually-advanced clock for timeout tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `d`.
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().expect("manual clock poisoned");
        *now += d;
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        *self.now.lock().expect("manual clock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_only_on_demand() {
        let c = ManualClock::new();
        assert_eq!(c.monotonic(), Duration::ZERO);
        c.advance(Duration::from_secs(3));
        c.advance(Duration::from_millis(500));
        assert_eq!(c.monotonic(), Duration::from_millis(3500));
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let c = MonotonicClock::new();
        let a = c.monotonic();
        let b = c.monotonic();
        assert!(b >= a);
    }
}
