//! Pool statistics.

use crate::proxy::Protocol;

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    valid4: u64,
    valid4a: u64,
    valid5: u64,
    dispensed: u64,
}

/// Counters for validated-by-protocol and dispensed endpoints.
/// All mutations are serialized under a single lock scoped to this object.
pub struct Statistics {
    counters: Mutex<Counters>,
    birthday: Instant,
}

/// Point-in-time view of the pool's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub valid4: u64,
    pub valid4a: u64,
    pub valid5: u64,
    pub dispensed: u64,
    pub uptime: Duration,
}

impl Statistics {
    pub(crate) fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            birthday: Instant::now(),
        }
    }

    pub(crate) fn record_valid(&self, protocol: Protocol) {
        let mut counters = self.counters.lock();
        match protocol {
            Protocol::Socks4 => counters.valid4 += 1,
            Protocol::Socks4a => counters.valid4a += 1,
            Protocol::Socks5 => counters.valid5 += 1,
            Protocol::Unknown => {}
        }
    }

    pub(crate) fn record_dispensed(&self) {
        self.counters.lock().dispensed += 1;
    }

    /// Total successful validations across all protocols.
    pub fn total_validated(&self) -> u64 {
        let counters = self.counters.lock();
        counters.valid4 + counters.valid4a + counters.valid5
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = *self.counters.lock();
        StatsSnapshot {
            valid4: counters.valid4,
            valid4a: counters.valid4a,
            valid5: counters.valid5,
            dispensed: counters.dispensed,
            uptime: self.birthday.elapsed(),
        }
    }

    /// Zero all counters. The creation timestamp is untouched.
    pub fn reset(&self) {
        *self.counters.lock() = Counters::default();
    }
}
