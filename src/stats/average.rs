use std::time::Duration;

/// Sum and count of request durations since the last read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingAverage {
    total: Duration,
    count: u64,
}

impl RollingAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, duration: Duration) {
        self.total = self.total.saturating_add(duration);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Average in milliseconds (0.0 with no samples), then resets.
    pub fn get_average_and_clear(&mut self) -> f64 {
        let average = if self.count == 0 {
            0.0
        } else {
            self.total.as_secs_f64() * 1000.0 / self.count as f64
        };
        *self = Self::default();
        average
    }
}
