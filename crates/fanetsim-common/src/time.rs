//! Virtual simulation time.
//!
//! The entire engine runs on a single monotonic timeline measured in
//! integer microseconds. `SimTime` is used both for instants and for
//! durations; subtraction of instants yields a duration of the same type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A point on (or span of) the virtual timeline, in microseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    /// The start of the timeline.
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_micros(us: u64) -> Self {
        SimTime(us)
    }

    pub const fn from_millis(ms: u64) -> Self {
        SimTime(ms * 1_000)
    }

    pub const fn from_secs(s: u64) -> Self {
        SimTime(s * 1_000_000)
    }

    /// Converts whole seconds expressed as a float; fractional microseconds
    /// are truncated. Intended for configuration values, not arithmetic.
    pub fn from_secs_f64(s: f64) -> Self {
        SimTime((s * 1e6) as u64)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e6
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn saturating_sub(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(other.0))
    }

    pub fn checked_sub(self, other: SimTime) -> Option<SimTime> {
        self.0.checked_sub(other.0).map(SimTime)
    }

    /// Scales a duration by an integer factor.
    pub const fn scaled(self, factor: u64) -> SimTime {
        SimTime(self.0 * factor)
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000 {
            write!(f, "{:.6}s", self.as_secs_f64())
        } else {
            write!(f, "{}us", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_agree() {
        assert_eq!(SimTime::from_millis(1), SimTime::from_micros(1_000));
        assert_eq!(SimTime::from_secs(1), SimTime::from_millis(1_000));
        assert_eq!(SimTime::from_secs_f64(0.5), SimTime::from_millis(500));
    }

    #[test]
    fn test_ordering_and_arithmetic() {
        let a = SimTime::from_micros(30);
        let b = SimTime::from_micros(50);
        assert!(a < b);
        assert_eq!(b - a, SimTime::from_micros(20));
        assert_eq!(a + b, SimTime::from_micros(80));
        assert_eq!(a.saturating_sub(b), SimTime::ZERO);
        assert_eq!(b.checked_sub(a), Some(SimTime::from_micros(20)));
        assert_eq!(a.checked_sub(b), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(SimTime::from_micros(30).to_string(), "30us");
        assert_eq!(SimTime::from_secs(2).to_string(), "2.000000s");
    }
}
