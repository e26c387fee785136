use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::clock;

/// Expiration timer state. At most one timer task is live.
#[derive(Debug, Default)]
pub(super) enum Watchdog {
    #[default]
    Disarmed,
    Armed {
        fires_at: DateTime<Utc>,
        handle: JoinHandle<()>,
    },
}

impl Watchdog {
    pub(super) fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            Watchdog::Disarmed => None,
            Watchdog::Armed { fires_at, .. } => Some(*fires_at),
        }
    }

    /// Stop the timer task and disarm.
    pub(super) fn cancel(&mut self) {
        if let Watchdog::Armed { handle, .. } = std::mem::take(self) {
            handle.abort();
        }
    }

    /// Disarm without aborting; used by the timer task on itself.
    pub(super) fn release(&mut self) {
        *self = Watchdog::Disarmed;
    }
}

/// How long the timer task should sleep before looking at the clock again,
/// or `None` once the deadline has been reached.
pub(super) fn next_wake(
    now: DateTime<Utc>,
    fires_at: DateTime<Utc>,
    recheck_interval: Option<Duration>,
) -> Option<Duration> {
    if now >= fires_at {
        return None;
    }
    let remaining = clock::until(now, fires_at);
    match recheck_interval {
        Some(interval) if !interval.is_zero() && interval < remaining => Some(interval),
        _ => Some(remaining),
    }
}
