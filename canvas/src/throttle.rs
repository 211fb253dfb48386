//! Rate limiter with a single coalescing slot.
//!
//! A value offered before the interval has elapsed replaces whatever was
//! pending; only the latest survives. The host drives time: every call takes
//! `now`, so the throttle never reads a clock or owns a timer.

#[cfg(test)]
#[path = "throttle_test.rs"]
mod throttle_test;

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_emit: None, pending: None }
    }

    fn due(&self, now: Instant) -> bool {
        self.last_emit.is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Emit `value` now if the interval allows, otherwise park it.
    pub fn offer(&mut self, value: T, now: Instant) -> Option<T> {
        if self.due(now) {
            self.last_emit = Some(now);
            self.pending = None;
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// Called once per animation frame: release the parked value if due.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_none() || !self.due(now) {
            return None;
        }
        self.last_emit = Some(now);
        self.pending.take()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any parked value and forget the last emission.
    pub fn reset(&mut self) {
        self.pending = None;
        self.last_emit = None;
    }
}
