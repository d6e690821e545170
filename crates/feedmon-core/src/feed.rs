use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub const MINUTES_PER_DAY: usize = 24 * 60;
pub const MSG_TAG: &str = "MSG ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEndpoint {
    #[serde(rename = "websocket_host")]
    pub host: String,
    #[serde(rename = "websocket_path")]
    pub path: String,
}

impl FeedEndpoint {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }

    pub fn url(&self) -> String {
        if self.path.starts_with('/') {
            format!("wss://{}{}", self.host, self.path)
        } else {
            format!("wss://{}/{}", self.host, self.path)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub features: Vec<Value>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub data: String,
}

impl ChatMessage {
    /// Best-effort decode of a `MSG` body; anything unparseable becomes the empty message.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    pub fn summary(&self) -> String {
        format!("{}: {}", self.nick, self.data)
    }

    /// `[YYYY-MM-DD HH:MM:SS +0000 UTC] <nick>: <data>`, timestamp truncated to whole seconds.
    pub fn log_line(&self) -> String {
        let stamp = Utc
            .timestamp_opt(self.timestamp.div_euclid(1000), 0)
            .single()
            .map(|at| at.format("%Y-%m-%d %H:%M:%S %z UTC").to_string())
            .unwrap_or_else(|| "invalid timestamp".to_string());
        format!("[{stamp}] {}: {}", self.nick, self.data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawFrame<'a> {
    Message(&'a str),
    Other(&'a str),
}

impl<'a> RawFrame<'a> {
    pub fn classify(frame: &'a str) -> Self {
        match frame.strip_prefix(MSG_TAG) {
            Some(body) => RawFrame::Message(body),
            None => RawFrame::Other(frame),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Streaming,
    Reconnecting { attempt: u32 },
    Aborted,
}

impl ConnectionPhase {
    pub fn label(&self) -> String {
        match self {
            ConnectionPhase::Disconnected => "disconnected".to_string(),
            ConnectionPhase::Connecting => "connecting".to_string(),
            ConnectionPhase::Streaming => "streaming".to_string(),
            ConnectionPhase::Reconnecting { attempt } => format!("reconnecting (try {attempt})"),
            ConnectionPhase::Aborted => "aborted".to_string(),
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Per-feed counters and status, owned by the feed's supervisor and published by value.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    pub endpoint: Arc<FeedEndpoint>,
    pub phase: ConnectionPhase,
    pub connected: bool,
    /// Messages received on `day`.
    pub counter: u64,
    /// Messages received since the process started; never reset.
    pub total: u64,
    pub minutes: Vec<u32>,
    pub current_minute: usize,
    pub day: NaiveDate,
    pub last_error: Option<String>,
    pub note: Option<String>,
    pub last_message: String,
    pub sink_failures: u64,
}

impl FeedState {
    pub fn new(endpoint: Arc<FeedEndpoint>, now: NaiveDateTime) -> Self {
        Self {
            endpoint,
            phase: ConnectionPhase::Disconnected,
            connected: false,
            counter: 0,
            total: 0,
            minutes: vec![0; MINUTES_PER_DAY],
            current_minute: minute_index(now),
            day: now.date(),
            last_error: None,
            note: None,
            last_message: String::new(),
            sink_failures: 0,
        }
    }

    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }

    /// Resets the day counters when `now` falls on a later calendar day.
    ///
    /// Returns the new day so the caller can rotate its log destination.
    pub fn roll_over(&mut self, now: NaiveDateTime) -> Option<NaiveDate> {
        let today = now.date();
        if today == self.day {
            return None;
        }
        self.day = today;
        self.counter = 0;
        self.minutes = vec![0; MINUTES_PER_DAY];
        self.current_minute = minute_index(now);
        Some(today)
    }

    /// Counts one chat message received at `now`.
    pub fn record_message(
        &mut self,
        now: NaiveDateTime,
        message: &ChatMessage,
    ) -> Option<NaiveDate> {
        let rolled = self.roll_over(now);
        self.counter += 1;
        self.total += 1;
        self.current_minute = minute_index(now);
        self.minutes[self.current_minute] += 1;
        self.last_message = message.summary();
        rolled
    }
}

pub fn minute_index(now: NaiveDateTime) -> usize {
    let index = now.hour() as usize * 60 + now.minute() as usize;
    index.min(MINUTES_PER_DAY - 1)
}

/// Wall clock used for day rollover and minute bucketing.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    seconds: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            seconds: Arc::new(AtomicI64::new(start.and_utc().timestamp())),
        }
    }

    pub fn set(&self, at: NaiveDateTime) {
        self.seconds.store(at.and_utc().timestamp(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        let seconds = self.seconds.load(Ordering::SeqCst);
        chrono::DateTime::from_timestamp(seconds, 0)
            .map(|at| at.naive_utc())
            .unwrap_or_default()
    }
}
