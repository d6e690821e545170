use crate::aggregator::RateUpdate;
use feedmon_core::series::{generate_random_walk, scroll_random_walk};
use feedmon_core::Series;
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

pub const DEMO_HOST: &str = "demo";
pub const DEMO_TICK: Duration = Duration::from_millis(250);
pub const DEMO_WIDTH: usize = 120;
const DEMO_STEP: f64 = 2.0;
const DEMO_START: f64 = 20.0;

/// Offline stand-in for a feed: a random walk that scrolls one sample per tick.
pub struct RandomWalkFeed<R> {
    feed_id: usize,
    rng: R,
    series: Series,
}

impl<R: Rng> RandomWalkFeed<R> {
    pub fn new(feed_id: usize, mut rng: R, size: usize) -> Self {
        let series = generate_random_walk(&mut rng, size.max(1), DEMO_STEP, DEMO_START);
        Self {
            feed_id,
            rng,
            series,
        }
    }

    pub fn advance(&mut self) -> RateUpdate {
        self.series = scroll_random_walk(&mut self.rng, &self.series, DEMO_STEP, 1);
        RateUpdate {
            feed_id: self.feed_id,
            series: self.series.clone(),
        }
    }

    pub async fn run(mut self, every: Duration, output: mpsc::Sender<RateUpdate>) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if output.send(self.advance()).await.is_err() {
                debug!(event = "demo_output_closed", feed_id = self.feed_id);
                return;
            }
        }
    }
}
