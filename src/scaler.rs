//! Worker pool autoscaling.
//!
//! The decision policy is a pure function of capacity and throughput
//! counters so it can be tested without timers; tick gating is a separate
//! concern that takes the current instant as an argument.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// How often a scaling decision may take effect.
pub const SCALE_TICK: Duration = Duration::from_millis(250);

/// Pluggable capacity policy for the validation worker pool.
pub trait Scale: Send + Sync {
    /// Given the current capacity and the totals validated/dispensed so far,
    /// return the new capacity, or `None` to leave it unchanged.
    fn decide(&self, capacity: usize, validated: u64, dispensed: u64) -> Option<usize>;
}

/// Default policy: grow while validated supply trails dispensing demand
/// (plus slack), shed back toward the baseline once supply is comfortably
/// ahead. Bounded by `[min, max]`.
pub struct ThroughputScaler {
    min: usize,
    max: usize,
    step: usize,
    slack: u64,
}

impl ThroughputScaler {
    pub fn new(min: usize, max: usize) -> Self {
        let min = min.max(1);
        Self {
            min,
            max: max.max(min),
            step: 1,
            slack: 10,
        }
    }

    /// Capacity change applied per decision.
    pub fn step(mut self, step: usize) -> Self {
        self.step = step.max(1);
        self
    }
}

impl Scale for ThroughputScaler {
    fn decide(&self, capacity: usize, validated: u64, dispensed: u64) -> Option<usize> {
        if validated < dispensed + self.slack {
            if capacity < self.max {
                return Some((capacity + self.step).min(self.max));
            }
        } else if capacity > self.min {
            return Some(capacity.saturating_sub(self.step).max(self.min));
        }
        None
    }
}

/// Gates scaling decisions to at most one per tick interval. Calls between
/// ticks are no-ops regardless of call frequency.
pub struct TickGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl TickGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Whether a tick boundary has passed since the last accepted call.
    /// Takes `now` as an argument so tests can fabricate instants.
    pub fn ready(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
