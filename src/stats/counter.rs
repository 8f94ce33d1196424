use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::stats::average::RollingAverage;

/// Aggregate traffic over one sampling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Average relay duration in milliseconds
    pub requests_time_average: f64,
    pub requests_finished: u64,
    pub kbytes_sent: f64,
    pub kbytes_received: f64,
}

impl StatsSnapshot {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Default)]
struct Accumulators {
    durations: RollingAverage,
    finished: u64,
    bytes_sent: u64,
    bytes_received: u64,
}

/// Process-wide traffic counters.
///
/// All accumulators sit behind one lock, so a snapshot never splits a
/// concurrent update: each one lands entirely before or after it.
#[derive(Debug, Default)]
pub struct StatsCounter {
    inner: Mutex<Accumulators>,
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Accumulators> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add(&self, duration: Duration) {
        self.lock().durations.add(duration);
    }

    pub fn increment_finished(&self) {
        self.lock().finished += 1;
    }

    pub fn add_bytes(&self, sent: u64, received: u64) {
        let mut acc = self.lock();
        acc.bytes_sent += sent;
        acc.bytes_received += received;
    }

    /// Records one completed relay in a single update.
    pub fn record(&self, duration: Duration, sent: u64, received: u64) {
        let mut acc = self.lock();
        acc.durations.add(duration);
        acc.finished += 1;
        acc.bytes_sent += sent;
        acc.bytes_received += received;
    }

    /// Reads and resets every accumulator.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut acc = self.lock();
        let taken = std::mem::take(&mut *acc);
        drop(acc);

        let mut durations = taken.durations;
        StatsSnapshot {
            requests_time_average: durations.get_average_and_clear(),
            requests_finished: taken.finished,
            kbytes_sent: taken.bytes_sent as f64 / 1024.0,
            kbytes_received: taken.bytes_received as f64 / 1024.0,
        }
    }
}
