use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::stats::counter::{StatsCounter, StatsSnapshot};

const CHANNEL_CAPACITY: usize = 64;

/// Takes a snapshot every interval, logs it and publishes it to subscribers.
pub struct StatsReporter {
    counter: Arc<StatsCounter>,
    interval: Duration,
    sender: broadcast::Sender<StatsSnapshot>,
}

impl StatsReporter {
    pub fn new(counter: Arc<StatsCounter>, interval: Duration) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            counter,
            interval,
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatsSnapshot> {
        self.sender.subscribe()
    }

    /// Emits one snapshot now.
    pub fn emit(&self) -> StatsSnapshot {
        emit(&self.counter, &self.sender)
    }

    /// Runs the periodic emitter until `shutdown` flips to true.
    pub fn spawn(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let counter = self.counter.clone();
        let sender = self.sender.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        emit(&counter, &sender);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Stats reporter stopped");
        })
    }
}

fn emit(counter: &StatsCounter, sender: &broadcast::Sender<StatsSnapshot>) -> StatsSnapshot {
    let snapshot = counter.snapshot();

    tracing::info!(
        requests_time_average = snapshot.requests_time_average,
        requests_finished = snapshot.requests_finished,
        kbytes_sent = snapshot.kbytes_sent,
        kbytes_received = snapshot.kbytes_received,
        "stats"
    );

    // no subscribers is fine
    let _ = sender.send(snapshot);
    snapshot
}
