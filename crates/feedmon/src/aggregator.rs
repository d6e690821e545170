use feedmon_core::Series;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct RateUpdate {
    pub feed_id: usize,
    pub series: Series,
}

/// Samples a feed's running message total and publishes messages-per-interval.
pub struct RateAggregator {
    feed_id: usize,
    interval: Duration,
    total: watch::Receiver<u64>,
    output: mpsc::Sender<RateUpdate>,
}

impl RateAggregator {
    pub fn new(
        feed_id: usize,
        interval: Duration,
        total: watch::Receiver<u64>,
        output: mpsc::Sender<RateUpdate>,
    ) -> Self {
        Self {
            feed_id,
            interval,
            total,
            output,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut previous = 0u64;
        let mut series = Series::new();
        loop {
            ticker.tick().await;
            let current = *self.total.borrow();
            series.push(rate_delta(previous, current));
            previous = current;
            let update = RateUpdate {
                feed_id: self.feed_id,
                series: series.clone(),
            };
            if self.output.send(update).await.is_err() {
                debug!(event = "rate_output_closed", feed_id = self.feed_id);
                return;
            }
        }
    }
}

pub fn rate_delta(previous: u64, current: u64) -> f64 {
    current.saturating_sub(previous) as f64
}
