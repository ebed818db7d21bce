//! Baseline clock for event timestamps.
//!
//! All trace timestamps are elapsed seconds since a zero point captured
//! when the runtime initializes. `CLOCK_MONOTONIC` is used when the kernel
//! provides it; otherwise the baseline degrades to `CLOCK_REALTIME`, in
//! which case timestamps are only as monotonic as the wall clock
//! (`is_monotonic` reports which source is in effect).

use nix::time::{clock_gettime, ClockId};

/// Fixed reference timestamp captured once at startup.
#[derive(Debug, Clone, Copy)]
pub struct Baseline {
    tzero_sec: i64,
    tzero_nsec: i64,
    clock: ClockId,
}

impl Baseline {
    /// Capture the zero point now.
    pub fn now() -> Self {
        let (clock, tzero) = match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => (ClockId::CLOCK_MONOTONIC, ts),
            Err(_) => (
                ClockId::CLOCK_REALTIME,
                clock_gettime(ClockId::CLOCK_REALTIME).unwrap_or_else(|e| {
                    // A machine without a readable realtime clock cannot
                    // produce a trace at all.
                    panic!("no usable clock source: {e}")
                }),
            ),
        };
        Self {
            tzero_sec: tzero.tv_sec(),
            tzero_nsec: tzero.tv_nsec(),
            clock,
        }
    }

    /// Seconds elapsed since the baseline, fractional-nanosecond precision.
    ///
    /// Non-decreasing across calls within a thread when the monotonic
    /// source is in effect.
    pub fn elapsed_seconds(&self) -> f64 {
        let now = match clock_gettime(self.clock) {
            Ok(ts) => ts,
            Err(_) => return 0.0,
        };
        let mut sec = now.tv_sec() - self.tzero_sec;
        let mut nsec = now.tv_nsec() - self.tzero_nsec;
        if nsec < 0 {
            sec -= 1;
            nsec += 1_000_000_000;
        }
        sec as f64 + nsec as f64 / 1.0e9
    }

    /// Whether timestamps come from a truly monotonic source.
    pub fn is_monotonic(&self) -> bool {
        self.clock == ClockId::CLOCK_MONOTONIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_nonnegative() {
        let baseline = Baseline::now();
        assert!(baseline.elapsed_seconds() >= 0.0);
    }

    #[test]
    fn test_elapsed_is_monotonic_within_thread() {
        let baseline = Baseline::now();
        let mut prev = baseline.elapsed_seconds();
        for _ in 0..1000 {
            let next = baseline.elapsed_seconds();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn test_elapsed_advances() {
        let baseline = Baseline::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(baseline.elapsed_seconds() >= 0.005);
    }

    #[test]
    fn test_linux_baseline_is_monotonic() {
        // CLOCK_MONOTONIC is always readable on Linux.
        assert!(Baseline::now().is_monotonic());
    }
}
