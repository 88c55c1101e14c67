//! Idle-time scheduling primitives.
//!
//! [`Clock`] abstracts the monotonic time source so drains can be driven
//! deterministically; [`IdleDeadline`] is what an idle callback receives.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time since an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall clock measured from its creation.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    time_origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            time_origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.time_origin.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: Duration) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

/// Remaining idle budget of the current idle period.
pub trait IdleDeadline {
    fn time_remaining(&self) -> Duration;

    /// The callback ran because its timeout expired.
    fn did_timeout(&self) -> bool {
        false
    }
}

/// Deadline that expires once `clock` passes `started + budget`.
pub struct ClockDeadline<'a> {
    clock: &'a dyn Clock,
    end: Duration,
}

impl<'a> ClockDeadline<'a> {
    pub fn new(clock: &'a dyn Clock, budget: Duration) -> Self {
        let end = clock.now() + budget;
        Self { clock, end }
    }
}

impl IdleDeadline for ClockDeadline<'_> {
    fn time_remaining(&self) -> Duration {
        self.end.saturating_sub(self.clock.now())
    }
}

/// Deadline that grants a fixed number of checks, then reports no time.
///
/// Useful to bound a drain by work items rather than time.
#[derive(Debug)]
pub struct CountdownDeadline {
    checks: Mutex<usize>,
}

impl CountdownDeadline {
    pub fn new(checks: usize) -> Self {
        Self {
            checks: Mutex::new(checks),
        }
    }
}

impl IdleDeadline for CountdownDeadline {
    fn time_remaining(&self) -> Duration {
        let mut checks = self.checks.lock();
        if *checks == 0 {
            return Duration::ZERO;
        }
        *checks -= 1;
        Duration::from_millis(1)
    }
}

/// Give other tasks on the executor one turn.
pub async fn yield_tick() {
    tokio::task::yield_now().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(3));
        assert_eq!(other.now(), Duration::from_millis(3));
        other.set(Duration::from_millis(1));
        assert_eq!(clock.now(), Duration::from_millis(1));
    }

    #[test]
    fn test_clock_deadline() {
        let clock = ManualClock::new();
        let deadline = ClockDeadline::new(&clock, Duration::from_millis(5));
        assert_eq!(deadline.time_remaining(), Duration::from_millis(5));

        clock.advance(Duration::from_millis(4));
        assert_eq!(deadline.time_remaining(), Duration::from_millis(1));

        clock.advance(Duration::from_millis(4));
        assert_eq!(deadline.time_remaining(), Duration::ZERO);
        assert!(!deadline.did_timeout());
    }

    #[test]
    fn test_countdown_deadline() {
        let deadline = CountdownDeadline::new(2);
        assert!(deadline.time_remaining() > Duration::ZERO);
        assert!(deadline.time_remaining() > Duration::ZERO);
        assert_eq!(deadline.time_remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_yield_tick_returns() {
        yield_tick().await;
    }
}
