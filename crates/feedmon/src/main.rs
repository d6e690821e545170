use anyhow::{Context, Result};
use clap::Parser;
use feedmon::aggregator::{RateAggregator, RateUpdate};
use feedmon::dashboard::{run_dashboard, Dashboard, DashboardInputs};
use feedmon::demo::{RandomWalkFeed, DEMO_HOST, DEMO_TICK, DEMO_WIDTH};
use feedmon::supervisor::{FeedUpdate, Supervisor, WebSocketDialer};
use feedmon::terminal::{run_input, TerminalSurface};
use feedmon_core::{Clock, FeedEndpoint, FeedsConfig, SystemClock};
use feedmon_storage::DailyLog;
use rand::{rngs::StdRng, SeedableRng};
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

const FEED_CHANNEL_CAPACITY: usize = 256;
const RATE_CHANNEL_CAPACITY: usize = 16;
const INPUT_CHANNEL_CAPACITY: usize = 16;
const LOG_FILE: &str = "feedmon.log";

#[derive(Parser, Debug)]
#[command(name = "feedmon", about = "Live message-rate monitor for chat websocket feeds")]
struct Args {
    #[arg(long, env = "FEEDMON_CONFIG", default_value = "config.json")]
    config: PathBuf,
    #[arg(long, env = "FEEDMON_LOG_ROOT", default_value = ".")]
    log_root: PathBuf,
    /// Seconds between rate samples.
    #[arg(long, default_value_t = 15)]
    sample_interval: u64,
    #[arg(long, default_value_t = 50)]
    redraw_ms: u64,
    #[arg(long, default_value_t = false)]
    auto_squash: bool,
    /// Graph a random walk instead of connecting to any feed.
    #[arg(long, default_value_t = false)]
    demo: bool,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Clone, Debug)]
struct Settings {
    config_path: PathBuf,
    log_root: PathBuf,
    sample_interval: Duration,
    redraw: Duration,
    auto_squash: bool,
    demo: bool,
    debug: bool,
    log_stdout: bool,
}

fn load_settings() -> Settings {
    settings_from(Args::parse())
}

fn settings_from(args: Args) -> Settings {
    Settings {
        config_path: args.config,
        log_root: args.log_root,
        sample_interval: Duration::from_secs(args.sample_interval.max(1)),
        redraw: Duration::from_millis(args.redraw_ms.max(1)),
        auto_squash: args.auto_squash,
        demo: args.demo,
        debug: args.debug || env_true("FEEDMON_DEBUG"),
        log_stdout: env_true("FEEDMON_LOG_STDOUT"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load_settings();
    let _log_guard = init_logging(&settings);

    let endpoints = if settings.demo {
        vec![Arc::new(FeedEndpoint::new(DEMO_HOST, "/"))]
    } else {
        FeedsConfig::load(&settings.config_path)
            .with_context(|| {
                format!("loading feeds from {}", settings.config_path.display())
            })?
            .endpoints()
    };
    info!(event = "feedmon_start", feeds = endpoints.len(), demo = settings.demo);

    let (feed_tx, feeds) = mpsc::channel(FEED_CHANNEL_CAPACITY);
    let (rate_tx, rates) = mpsc::channel(RATE_CHANNEL_CAPACITY);
    let (action_tx, actions) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    let (cancel_tx, cancel) = watch::channel(false);

    if settings.demo {
        let feed = RandomWalkFeed::new(0, StdRng::from_os_rng(), DEMO_WIDTH);
        tokio::spawn(feed.run(DEMO_TICK, rate_tx));
    } else {
        spawn_feeds(&settings, &endpoints, feed_tx, rate_tx);
    }

    let mut surface = TerminalSurface::enter().context("failed to enter terminal")?;
    tokio::spawn(run_input(action_tx, cancel_tx));
    let inputs = DashboardInputs {
        feeds,
        rates,
        actions,
        cancel,
    };
    let dashboard = Dashboard::new(&endpoints, settings.auto_squash);
    let result = run_dashboard(dashboard, &mut surface, inputs, settings.redraw).await;
    surface.restore().context("failed to restore terminal")?;
    result.context("dashboard failed")?;
    info!(event = "feedmon_stop");
    Ok(())
}

fn spawn_feeds(
    settings: &Settings,
    endpoints: &[Arc<FeedEndpoint>],
    feed_tx: mpsc::Sender<FeedUpdate>,
    rate_tx: mpsc::Sender<RateUpdate>,
) {
    for (feed_id, endpoint) in endpoints.iter().enumerate() {
        let clock = SystemClock;
        let log = DailyLog::new(&settings.log_root, &endpoint.host, clock.now().date());
        let (total_tx, total_rx) = watch::channel(0);
        let supervisor = Supervisor::new(
            feed_id,
            endpoint.clone(),
            WebSocketDialer,
            clock,
            log,
            feed_tx.clone(),
            total_tx,
        );
        tokio::spawn(supervisor.run());
        let aggregator =
            RateAggregator::new(feed_id, settings.sample_interval, total_rx, rate_tx.clone());
        tokio::spawn(aggregator.run());
    }
}

fn init_logging(settings: &Settings) -> Option<LogGuard> {
    let level = if settings.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("FEEDMON_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let guard = match open_log_file(&settings.log_root) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = guard.file.clone();
    let mirror_stdout = settings.log_stdout;
    let make_writer = BoxMakeWriter::new(move || LogWriter::new(file.clone(), mirror_stdout));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

/// Diagnostics go to the log file; the terminal belongs to the dashboard unless mirroring is on.
struct LogWriter {
    stdout: Option<io::Stdout>,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl LogWriter {
    fn new(file: Option<Arc<Mutex<std::fs::File>>>, mirror_stdout: bool) -> Self {
        Self {
            stdout: mirror_stdout.then(io::stdout),
            file,
        }
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(stdout) = self.stdout.as_mut() {
            let _ = stdout.write_all(buf);
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(stdout) = self.stdout.as_mut() {
            let _ = stdout.flush();
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_root: &Path) -> io::Result<LogGuard> {
    std::fs::create_dir_all(log_root)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_root.join(LOG_FILE))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cli() {
        let args = Args::try_parse_from(["feedmon"]).expect("parse defaults");
        let settings = settings_from(args);
        assert_eq!(settings.sample_interval, Duration::from_secs(15));
        assert_eq!(settings.redraw, Duration::from_millis(50));
        assert!(!settings.auto_squash);
        assert!(!settings.demo);
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let args = Args::try_parse_from([
            "feedmon",
            "--sample-interval",
            "0",
            "--redraw-ms",
            "0",
            "--auto-squash",
            "--demo",
        ])
        .expect("parse flags");
        let settings = settings_from(args);
        assert_eq!(settings.sample_interval, Duration::from_secs(1));
        assert_eq!(settings.redraw, Duration::from_millis(1));
        assert!(settings.auto_squash);
        assert!(settings.demo);
    }

    #[test]
    fn log_file_lands_under_log_root() {
        let root = tempfile::tempdir().expect("temp dir");
        let nested = root.path().join("logs");
        let guard = open_log_file(&nested).expect("open log");
        assert!(guard.file.is_some());
        assert!(nested.join(LOG_FILE).exists());
    }
}
