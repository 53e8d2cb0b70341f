// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster time source.
//!
//! Everything time-dependent in the cluster reduces to two stamps:
//! epoch milliseconds drive heartbeat liveness and cache expiry, and
//! epoch seconds mark elements and seed job ids. The daemons take the
//! source by injection so membership and expiry are testable without
//! sleeping.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Source of the two wall-clock stamps the cluster runs on.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Milliseconds since the epoch. Stamps heartbeats and cached
    /// elements.
    fn epoch_ms(&self) -> u64;

    /// Whole seconds since the epoch. Stamps elements and seeds job
    /// ids.
    fn epoch_secs(&self) -> u64;
}

/// The live wall clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        unix_time().as_millis() as u64
    }

    fn epoch_secs(&self) -> u64 {
        unix_time().as_secs()
    }
}

fn unix_time() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// A clock that only moves when a test tells it to. Clones share the
/// same counter, so the clock handed to a service can be advanced from
/// the outside.
#[derive(Clone)]
pub struct FakeClock {
    epoch_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    /// Starts well past zero so entries stamped at the start still have
    /// a meaningful age.
    pub fn new() -> Self {
        FakeClock { epoch_ms: Arc::new(Mutex::new(1_000_000)) }
    }

    /// Jump forward by `step`.
    pub fn advance(&self, step: Duration) {
        *self.epoch_ms.lock() += step.as_millis() as u64;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }

    fn epoch_secs(&self) -> u64 {
        self.epoch_ms() / 1000
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
