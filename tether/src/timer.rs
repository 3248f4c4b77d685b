//! Recurring timers.
//!
//! The session never sleeps. It records deadlines and exposes the earliest
//! one; whoever drives the session calls `poll_timers` once it has passed.

use std::time::{Duration, Instant};

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Fixed-interval timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurringTimer {
    interval: Duration,
    deadline: Instant,
}

impl RecurringTimer {
    /// Arm a timer that first fires one `interval` after `now`.
    pub fn start(now: Instant, interval: Duration) -> Self {
        Self {
            interval,
            deadline: now + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns true and schedules the next deadline if this one has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.deadline {
            return false;
        }
        self.deadline = now + self.interval;
        true
    }
}
