use feedmon_core::{ChatMessage, Clock, ConnectionPhase, FeedEndpoint, FeedState, RawFrame};
use feedmon_storage::DailyLog;
use futures_util::future::{self, BoxFuture};
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

pub const MAX_RECONNECT_ATTEMPTS: u32 = 50;
const RECONNECT_STEP_MS: u64 = 100 * 3;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid feed url: {0}")]
    Url(#[from] url::ParseError),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed by peer")]
    Closed,
}

/// Text frames from one connection; an `Err` or the end of the stream ends the connection.
pub type FrameStream = BoxStream<'static, Result<String, FeedError>>;

pub trait Dialer: Send + 'static {
    fn dial(
        &mut self,
        endpoint: &FeedEndpoint,
    ) -> BoxFuture<'static, Result<FrameStream, FeedError>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketDialer;

impl Dialer for WebSocketDialer {
    fn dial(
        &mut self,
        endpoint: &FeedEndpoint,
    ) -> BoxFuture<'static, Result<FrameStream, FeedError>> {
        let url = endpoint.url();
        async move {
            let url = Url::parse(&url)?;
            let (ws, _) = connect_async(url.as_str()).await?;
            let frames = ws
                .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
                .filter_map(|msg| {
                    future::ready(match msg {
                        Ok(Message::Text(text)) => Some(Ok(text)),
                        Ok(_) => None,
                        Err(err) => Some(Err(FeedError::from(err))),
                    })
                });
            Ok(frames.boxed())
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub feed_id: usize,
    pub state: FeedState,
}

pub fn reconnect_delay(attempt: u32) -> Duration {
    Duration::from_millis(RECONNECT_STEP_MS * u64::from(attempt))
}

/// Owns one feed connection and its `FeedState`.
///
/// Snapshots of the state are published on `updates`; the running message total is
/// published on `total` for the rate aggregator.
pub struct Supervisor<D, C> {
    feed_id: usize,
    dialer: D,
    clock: C,
    state: FeedState,
    log: DailyLog,
    updates: mpsc::Sender<FeedUpdate>,
    total: watch::Sender<u64>,
}

impl<D: Dialer, C: Clock> Supervisor<D, C> {
    pub fn new(
        feed_id: usize,
        endpoint: Arc<FeedEndpoint>,
        dialer: D,
        clock: C,
        log: DailyLog,
        updates: mpsc::Sender<FeedUpdate>,
        total: watch::Sender<u64>,
    ) -> Self {
        let state = FeedState::new(endpoint, clock.now());
        Self {
            feed_id,
            dialer,
            clock,
            state,
            log,
            updates,
            total,
        }
    }

    pub async fn run(mut self) {
        let host = self.state.endpoint.host.clone();
        self.state.phase = ConnectionPhase::Connecting;
        if !self.publish().await {
            return;
        }

        let mut cause = match self.dialer.dial(&self.state.endpoint).await {
            Ok(mut frames) => {
                info!(event = "feed_connected", feed = %host);
                self.state.phase = ConnectionPhase::Streaming;
                self.state.connected = true;
                if !self.publish().await {
                    return;
                }
                match self.stream(&mut frames).await {
                    Some(cause) => cause,
                    None => return,
                }
            }
            Err(err) => err.to_string(),
        };

        loop {
            warn!(event = "feed_read_error", feed = %host, error = %cause);
            let Some(mut frames) = self.reconnect(cause).await else {
                return;
            };
            cause = match self.stream(&mut frames).await {
                Some(cause) => cause,
                None => return,
            };
        }
    }

    /// Reads until the connection fails. Returns the failure, or `None` when the
    /// dashboard has gone away.
    async fn stream(&mut self, frames: &mut FrameStream) -> Option<String> {
        loop {
            match frames.next().await {
                Some(Ok(frame)) => {
                    if !self.handle_frame(&frame).await {
                        return None;
                    }
                }
                Some(Err(err)) => return Some(err.to_string()),
                None => return Some(FeedError::Closed.to_string()),
            }
        }
    }

    async fn reconnect(&mut self, mut cause: String) -> Option<FrameStream> {
        let host = self.state.endpoint.host.clone();
        let mut attempt: u32 = 0;
        loop {
            self.state.phase = ConnectionPhase::Reconnecting { attempt };
            self.state.connected = false;
            self.state.note = None;
            self.state.last_error = Some(format!(
                "error trying to read from websocket ({cause}), try: {attempt}"
            ));
            if !self.publish().await {
                return None;
            }

            tokio::time::sleep(reconnect_delay(attempt)).await;
            match self.dialer.dial(&self.state.endpoint).await {
                Ok(mut frames) => match frames.next().await {
                    Some(Ok(first)) => {
                        info!(event = "feed_reconnected", feed = %host, attempt);
                        self.state.phase = ConnectionPhase::Streaming;
                        self.state.connected = true;
                        self.state.last_error = None;
                        self.state.note = Some("successfully reconnected".to_string());
                        if !self.publish().await || !self.handle_frame(&first).await {
                            return None;
                        }
                        return Some(frames);
                    }
                    Some(Err(err)) => cause = err.to_string(),
                    None => cause = FeedError::Closed.to_string(),
                },
                Err(err) => cause = err.to_string(),
            }
            debug!(event = "feed_redial_failed", feed = %host, attempt, error = %cause);

            attempt += 1;
            if attempt >= MAX_RECONNECT_ATTEMPTS {
                warn!(event = "feed_aborted", feed = %host, attempts = attempt);
                self.state.phase = ConnectionPhase::Aborted;
                self.state.last_error = Some(format!(
                    "aborting connection after {attempt} attempts ({cause})"
                ));
                self.publish().await;
                return None;
            }
        }
    }

    /// Returns `false` once nobody is listening for updates.
    async fn handle_frame(&mut self, frame: &str) -> bool {
        let body = match RawFrame::classify(frame) {
            RawFrame::Message(body) => body,
            RawFrame::Other(_) => return true,
        };
        let message = ChatMessage::parse(body);
        if let Some(day) = self.state.record_message(self.clock.now(), &message) {
            info!(event = "feed_day_rollover", feed = %self.state.endpoint.host, day = %day);
            self.log.rotate(day);
        }
        self.total.send_replace(self.state.total);

        if let Err(err) = self.log.append(&message.nick, &message.log_line()) {
            self.state.sink_failures += 1;
            warn!(event = "log_sink_error", feed = %self.state.endpoint.host, error = %err);
        }
        self.publish().await
    }

    async fn publish(&mut self) -> bool {
        let update = FeedUpdate {
            feed_id: self.feed_id,
            state: self.state.clone(),
        };
        if self.updates.send(update).await.is_err() {
            debug!(event = "feed_updates_closed", feed = %self.state.endpoint.host);
            return false;
        }
        true
    }
}
