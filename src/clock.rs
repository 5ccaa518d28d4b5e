//! Time source abstraction
//!
//! Durations are computed from an injected clock so that the state machine
//! can be driven deterministically in tests and replays.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// Used by tests and by the replay command, where sample timestamps come from
/// a recording rather than from the wall clock.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Set the absolute time
    pub fn set(&self, time: DateTime<Utc>) {
        *self.current.lock() = time;
    }

    /// Move the clock forward by fractional seconds
    pub fn advance_secs(&self, secs: f64) {
        let mut current = self.current.lock();
        *current = *current + secs_to_duration(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

/// Convert fractional seconds to a chrono duration at nanosecond resolution
pub fn secs_to_duration(secs: f64) -> Duration {
    Duration::nanoseconds((secs * 1_000_000_000.0).round() as i64)
}

/// Seconds elapsed from `from` to `to`, clamped at zero
pub fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    let secs = match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1_000_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    };
    secs.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(epoch());
        clock.advance_secs(2.6);
        assert!((elapsed_secs(epoch(), clock.now()) - 2.6).abs() < 1e-9);
    }

    #[test]
    fn test_elapsed_is_clamped_at_zero() {
        let later = epoch() + Duration::seconds(5);
        assert_eq!(elapsed_secs(later, epoch()), 0.0);
    }

    #[test]
    fn test_sub_microsecond_precision() {
        let to = epoch() + secs_to_duration(1.0000001);
        assert!(elapsed_secs(epoch(), to) > 1.0);
    }
}
