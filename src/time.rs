//! Monotonic timekeeping for burst accounting.

use core::time::Duration;

/// A point on the monotonic clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Instant(u64);

impl Instant {
    /// Read the monotonic clock.
    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // clock_gettime is async-signal-safe and cannot fail for CLOCK_MONOTONIC.
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        Instant((ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    pub fn duration_since(self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    pub fn elapsed(self) -> Duration {
        Instant::now().duration_since(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let a = Instant::now();
        let b = Instant::now();
        assert!(b >= a);
        assert!(a.as_nanos() > 0);
    }

    #[test]
    fn test_duration_since_saturates() {
        let early = Instant(10);
        let late = Instant(25);
        assert_eq!(late.duration_since(early), Duration::from_nanos(15));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }
}
