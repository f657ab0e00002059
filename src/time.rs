//! Session time and the clocks that drive it.
//!
//! All scheduling is expressed in [`SimTime`], milliseconds since the session started.
//! A [`Clock`] turns wall time into `SimTime`; [`ManualClock`] lets tests and replays step
//! time explicitly so that the whole core runs on a simulated timeline.

use std::sync::Arc;

use parking_lot::Mutex;
use web_time::{Duration, Instant};

/// A point on the session timeline, in whole milliseconds since session start.
///
/// # Examples
///
/// ```
/// use whack_sync::SimTime;
/// use web_time::Duration;
///
/// let t = SimTime::from_millis(1_500);
/// assert_eq!(t + Duration::from_millis(500), SimTime::from_secs(2));
/// assert!(SimTime::ZERO < t);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct SimTime(u64);

impl SimTime {
    /// Session start.
    pub const ZERO: SimTime = SimTime(0);

    /// Creates a `SimTime` from milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        SimTime(millis)
    }

    /// Creates a `SimTime` from whole seconds.
    #[inline]
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        SimTime(secs.saturating_mul(1000))
    }

    /// Returns the underlying millisecond count.
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is later.
    #[inline]
    #[must_use]
    pub fn saturating_duration_since(self, earlier: SimTime) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl std::ops::Add<Duration> for SimTime {
    type Output = SimTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        SimTime(self.0.saturating_add(millis))
    }
}

impl std::ops::AddAssign<Duration> for SimTime {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

/// Source of monotonic session time.
pub trait Clock {
    /// The current time on the session timeline. Must never go backwards.
    fn now(&self) -> SimTime;
}

/// Wall clock anchored at construction, backed by `web_time::Instant` so it also works
/// on wasm targets.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Starts a clock at `SimTime::ZERO`.
    #[must_use]
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
    fn now(&self) -> SimTime {
        let millis = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        SimTime::from_millis(millis)
    }
}

/// A clock that only moves when told to. Clones share the same time.
///
/// # Examples
///
/// ```
/// use whack_sync::{Clock, ManualClock, SimTime};
///
/// let clock = ManualClock::new();
/// let view = clock.clone();
/// clock.advance_millis(250);
/// assert_eq!(view.now(), SimTime::from_millis(250));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<SimTime>>,
}

impl ManualClock {
    /// Creates a clock at `SimTime::ZERO`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by `millis`.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Moves time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }

    /// Jumps to `time`. Earlier times are ignored so the clock stays monotonic.
    pub fn set(&self, time: SimTime) {
        let mut now = self.now.lock();
        if time > *now {
            *now = time;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SimTime {
        *self.now.lock()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn sim_time_arithmetic_saturates() {
        let t = SimTime::from_millis(u64::MAX - 1);
        assert_eq!(t + Duration::from_secs(10), SimTime::from_millis(u64::MAX));
    }

    #[test]
    fn sim_time_duration_since() {
        let a = SimTime::from_secs(2);
        let b = SimTime::from_millis(500);
        assert_eq!(a.saturating_duration_since(b), Duration::from_millis(1500));
        assert_eq!(b.saturating_duration_since(a), Duration::ZERO);
    }

    #[test]
    fn sim_time_display() {
        assert_eq!(SimTime::from_millis(42).to_string(), "42ms");
    }

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();
        other.advance_millis(100);
        assert_eq!(clock.now(), SimTime::from_millis(100));
    }

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::new();
        clock.set(SimTime::from_secs(5));
        clock.set(SimTime::from_secs(1));
        assert_eq!(clock.now(), SimTime::from_secs(5));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
