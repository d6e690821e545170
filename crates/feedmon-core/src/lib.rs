pub mod config;
pub mod feed;
pub mod matrix;
pub mod series;

pub use config::{ConfigError, FeedsConfig};
pub use feed::{
    ChatMessage, Clock, ConnectionPhase, FeedEndpoint, FeedState, ManualClock, RawFrame,
    SystemClock,
};
pub use matrix::{compose, series_to_grid, text_to_grid, Grid};
pub use series::{Sample, Series};
