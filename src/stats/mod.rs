//! Traffic statistics
//!
//! Every completed relay feeds its duration and byte counts into a shared
//! [`StatsCounter`]. A [`StatsReporter`] task drains the counter on a fixed
//! interval and publishes the resulting [`StatsSnapshot`].

pub mod average;
pub mod counter;
pub mod reporter;

pub use average::RollingAverage;
pub use counter::{StatsCounter, StatsSnapshot};
pub use reporter::StatsReporter;
