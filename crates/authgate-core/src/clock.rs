//! Wall-clock sources for the session core.
//!
//! The manager never calls `Utc::now()` directly; it reads time through a
//! [`Clock`] so expiry can be driven by simulated time in tests.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that follows tokio's (possibly paused) timer clock.
///
/// Under `tokio::time::pause()` the wall time only moves when the test calls
/// `tokio::time::advance`, keeping the watchdog timer and `now()` in lockstep.
/// [`ManualClock::jump`] shifts wall time without touching the timer, which is
/// what a device suspend or a user changing the system time looks like.
#[derive(Debug)]
pub struct ManualClock {
    start: DateTime<Utc>,
    anchor: tokio::time::Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            anchor: tokio::time::Instant::now(),
            offset: Mutex::new(Duration::zero()),
        }
    }

    pub fn jump(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *offset = *offset + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = to_chrono(tokio::time::Instant::now() - self.anchor);
        let offset = *self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.start + elapsed + offset
    }
}

pub(crate) fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or(Duration::MAX)
}

/// Time left until `deadline`, zero if it has passed.
pub(crate) fn until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> std::time::Duration {
    (deadline - now).to_std().unwrap_or(std::time::Duration::ZERO)
}
