use crate::aggregator::RateUpdate;
use crate::supervisor::FeedUpdate;
use feedmon_core::series::{auto_squash_factor, format_series, resample, round_to_places, squash};
use feedmon_core::{compose, series_to_grid, text_to_grid, FeedEndpoint, FeedState, Grid, Series};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

pub const DEFAULT_REDRAW: Duration = Duration::from_millis(50);
const RECENT_SAMPLES: usize = 5;
/// Resampled rates are rounded to this many places so float noise never reads as a range.
const RESAMPLE_PLACES: i32 = 6;

/// Where composed frames end up. Sizes are in character cells.
pub trait Surface {
    fn size(&self) -> io::Result<(usize, usize)>;
    fn draw(&mut self, frame: &Grid) -> io::Result<()>;
    /// Forces a full repaint without touching dashboard state.
    fn resync(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Quit,
    Refresh,
    NextFeed,
}

struct Panel {
    endpoint: Arc<FeedEndpoint>,
    state: Option<FeedState>,
    series: Series,
}

impl Panel {
    fn status_lines(&self, lines: &mut Vec<String>) {
        let host = &self.endpoint.host;
        lines.push(host.clone());
        lines.push("=".repeat(host.chars().count().max(4)));
        let Some(state) = &self.state else {
            lines.push("waiting for supervisor".to_string());
            return;
        };
        lines.push(format!("state: {}", state.phase));
        lines.push(format!("messages received:  {}", state.counter));
        lines.push(format!("session total:      {}", state.total));
        if !state.last_message.is_empty() {
            lines.push(format!("last: {}", state.last_message));
        }
        if let Some(error) = &state.last_error {
            lines.push(String::new());
            lines.push(format!("error: {error}"));
        } else if let Some(note) = &state.note {
            lines.push(String::new());
            lines.push(note.clone());
        }
        if state.sink_failures > 0 {
            lines.push(format!("log write failures: {}", state.sink_failures));
        }
    }
}

/// Latest known state of every feed plus the view options.
pub struct Dashboard {
    panels: Vec<Panel>,
    selected: usize,
    auto_squash: bool,
}

impl Dashboard {
    pub fn new(endpoints: &[Arc<FeedEndpoint>], auto_squash: bool) -> Self {
        let panels = endpoints
            .iter()
            .map(|endpoint| Panel {
                endpoint: endpoint.clone(),
                state: None,
                series: Series::new(),
            })
            .collect();
        Self {
            panels,
            selected: 0,
            auto_squash,
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn apply_feed(&mut self, update: FeedUpdate) {
        match self.panels.get_mut(update.feed_id) {
            Some(panel) => panel.state = Some(update.state),
            None => debug!(event = "unknown_feed_update", feed_id = update.feed_id),
        }
    }

    pub fn apply_rate(&mut self, update: RateUpdate) {
        match self.panels.get_mut(update.feed_id) {
            Some(panel) => panel.series = update.series,
            None => debug!(event = "unknown_rate_update", feed_id = update.feed_id),
        }
    }

    pub fn select_next(&mut self) {
        if !self.panels.is_empty() {
            self.selected = (self.selected + 1) % self.panels.len();
        }
    }

    pub fn status_text(&self) -> String {
        let mut lines = Vec::new();
        for panel in &self.panels {
            panel.status_lines(&mut lines);
            lines.push(String::new());
        }
        if let Some(panel) = self.panels.get(self.selected) {
            lines.push(format!("graph: {} (tab to switch)", panel.endpoint.host));
            let skip = panel.series.len().saturating_sub(RECENT_SAMPLES);
            lines.push(format!("recent: {}", format_series(&panel.series[skip..])));
        }
        lines.join("\n")
    }

    /// Graph of the selected feed on the left two thirds, status text to its right.
    pub fn compose_frame(&self, width: usize, height: usize) -> Grid {
        let graph_width = width / 3 * 2;
        let series = match self.panels.get(self.selected) {
            Some(panel) if !panel.series.is_empty() => panel.series.clone(),
            _ => vec![0.0],
        };
        let max_height = height.saturating_sub(1);
        let target = if self.auto_squash {
            auto_squash_factor(&series, graph_width)
                .map_or(max_height, |level| level.min(max_height))
        } else {
            max_height
        };
        let graph = if graph_width == 0 {
            Grid::blank(0, 0)
        } else {
            let resampled = round_to_places(&resample(&series, graph_width), RESAMPLE_PLACES);
            series_to_grid(&squash(&resampled, target as f64))
        };
        let text = text_to_grid(&self.status_text());
        compose(
            &graph,
            0,
            height.saturating_sub(graph.height()),
            &text,
            graph_width + 1,
            0,
        )
    }
}

pub struct DashboardInputs {
    pub feeds: mpsc::Receiver<FeedUpdate>,
    pub rates: mpsc::Receiver<RateUpdate>,
    pub actions: mpsc::Receiver<InputAction>,
    pub cancel: watch::Receiver<bool>,
}

/// Redraws on every wake until quit or cancellation.
pub async fn run_dashboard<S: Surface>(
    mut dashboard: Dashboard,
    surface: &mut S,
    mut inputs: DashboardInputs,
    redraw: Duration,
) -> io::Result<()> {
    loop {
        if *inputs.cancel.borrow() {
            break;
        }
        let (width, height) = surface.size()?;
        surface.draw(&dashboard.compose_frame(width, height))?;

        tokio::select! {
            changed = inputs.cancel.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Some(update) = inputs.feeds.recv() => dashboard.apply_feed(update),
            Some(update) = inputs.rates.recv() => dashboard.apply_rate(update),
            Some(action) = inputs.actions.recv() => match action {
                InputAction::Quit => break,
                InputAction::Refresh => surface.resync()?,
                InputAction::NextFeed => dashboard.select_next(),
            },
            _ = tokio::time::sleep(redraw) => {}
        }
    }
    info!(event = "dashboard_stopped");
    Ok(())
}
