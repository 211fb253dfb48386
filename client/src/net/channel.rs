//! Reconnecting duplex message channel.
//!
//! DESIGN
//! ======
//! `Channel` is a cheap clone handle over shared state. `connect()` spawns a
//! single connection task that dials through a [`Connector`], pumps the
//! socket, and on an unexpected close sleeps per [`ReconnectPolicy`] before
//! dialing again. Every spawned task carries a generation number; bumping the
//! generation (via `disconnect()`) turns any older task into a no-op.
//!
//! `send()` never blocks and never fails. While open, text goes straight to
//! the writer; otherwise it joins a FIFO queue that is handed to the writer,
//! in order, right after the `connected` status has been emitted.
//!
//! ERROR HANDLING
//! ==============
//! Transport faults become `connection_status` events for listeners, never
//! `Err` values for callers. Malformed inbound text is logged and dropped.
//! Messages the writer had not yet written when the socket died are put
//! back at the head of the queue.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use frames::{ConnectionStatus, Message};
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tracing::{debug, info, warn};

/// Default relay endpoint when `SCENESYNC_WS_URL` is unset.
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8010/ws";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Socket(Box<tungstenite::Error>),
    #[error("connection closed")]
    Closed,
    #[error("binary frame is not valid UTF-8")]
    NonUtf8,
}

impl From<tungstenite::Error> for TransportError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Socket(Box::new(error))
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// How reconnect delays grow with the attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `base * 2^(attempt - 1)`.
    Exponential,
    /// `base * min(attempt, cap)`.
    Linear { cap: u32 },
}

/// Reconnect schedule. Delays never decrease with the attempt count and
/// never exceed `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retries allowed after the initial attempt before giving up.
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let raw = match self.strategy {
            BackoffStrategy::Exponential => {
                let shift = (attempt - 1).min(20);
                self.base_delay.saturating_mul(1_u32 << shift)
            }
            BackoffStrategy::Linear { cap } => self.base_delay.saturating_mul(attempt.min(cap.max(1))),
        };
        raw.min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub url: String,
    pub policy: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { url: DEFAULT_WS_URL.to_owned(), policy: ReconnectPolicy::default() }
    }
}

impl ChannelConfig {
    /// Read the relay URL from `SCENESYNC_WS_URL`, falling back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let url = std::env::var("SCENESYNC_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_owned());
        Self { url, ..Self::default() }
    }
}

// =============================================================================
// CONNECTOR
// =============================================================================

pub type LinkSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type LinkStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open connection: text frames out, text frames in. The stream ending
/// means the peer closed.
pub struct Link {
    pub sink: LinkSink,
    pub stream: LinkStream,
}

/// Dials the remote end. Production uses [`WsConnector`]; tests substitute
/// an in-memory pair.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}

/// `tokio-tungstenite` websocket connector.
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = socket.split();
        let sink = write.with(|text: String| future::ready(Ok::<_, TransportError>(WsMessage::Text(text.into()))));
        let stream = read.filter_map(|frame| {
            future::ready(match frame {
                Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(WsMessage::Binary(bytes)) => {
                    Some(String::from_utf8(bytes.to_vec()).map_err(|_| TransportError::NonUtf8))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            })
        });
        Ok(Link { sink: Box::pin(sink), stream: Box::pin(stream) })
    }
}

// =============================================================================
// CHANNEL
// =============================================================================

type Listener = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
struct State {
    status: ConnectionStatus,
    /// Failed attempts since the last successful open.
    attempt: u32,
    queue: VecDeque<String>,
    /// Present only while a socket is open and the queue has been handed over.
    writer: Option<mpsc::UnboundedSender<String>>,
    /// Set by `disconnect()`; suppresses automatic reconnects.
    intentional: bool,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<State>,
}

/// Handle returned by [`Channel::add_listener`].
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Remove the listener. Other listeners are unaffected.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.state().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    #[must_use]
    pub fn new(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        Self { inner: Arc::new(Inner { config, connector, state: Mutex::new(State::default()) }) }
    }

    /// A channel that dials real websockets.
    #[must_use]
    pub fn websocket(config: ChannelConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state().status
    }

    /// Failed attempts since the last successful open.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.inner.state().attempt
    }

    /// Messages waiting for a writer.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.state().queue.len()
    }

    /// Start connecting unless a connection is open, opening, or waiting out
    /// a backoff delay. Leaves the terminal `failed` state and clears a prior
    /// intentional disconnect.
    pub fn connect(&self) {
        let mut state = self.inner.state();
        let busy = match state.status {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => true,
            ConnectionStatus::Failed => false,
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                state.task.as_ref().is_some_and(|task| !task.is_finished())
            }
        };
        if busy {
            return;
        }
        if state.status == ConnectionStatus::Failed || state.intentional {
            state.attempt = 0;
        }
        state.intentional = false;
        state.generation += 1;
        let generation = state.generation;
        if let Some(stale) = state.task.take() {
            stale.abort();
        }
        state.task = Some(tokio::spawn(run(Arc::clone(&self.inner), generation)));
    }

    /// Deliver `message` now if open, otherwise queue it and start
    /// connecting. Local-only messages are refused. In the `failed` state
    /// messages are queued but no attempt is made until `connect()`.
    pub fn send(&self, message: Message) {
        let text = match frames::encode_message(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "channel: refusing to send");
                return;
            }
        };
        let mut state = self.inner.state();
        let pending = match &state.writer {
            Some(writer) => match writer.send(text) {
                Ok(()) => return,
                Err(returned) => returned.0,
            },
            None => text,
        };
        state.writer = None;
        state.queue.push_back(pending);
        let failed = state.status == ConnectionStatus::Failed;
        drop(state);
        if !failed {
            self.connect();
        }
    }

    /// Register an observer for every inbound message and status change.
    pub fn add_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let mut state = self.inner.state();
        state.next_listener += 1;
        let id = state.next_listener;
        state.listeners.push((id, Arc::new(listener)));
        Subscription { id, inner: Arc::downgrade(&self.inner) }
    }

    /// Close on purpose. No reconnect follows. An open socket finishes
    /// writing what it already accepted; anything still queued stays queued
    /// for the next `connect()`.
    pub fn disconnect(&self) {
        // Dropping the handle detaches a draining task.
        drop(self.stop());
    }

    /// Like [`Channel::disconnect`], but waits for an open socket to finish
    /// writing and close.
    pub async fn close(&self) {
        if let Some(draining) = self.stop() {
            if let Err(e) = draining.await {
                debug!(error = %e, "channel: connection task ended abnormally");
            }
        }
    }

    /// Returns the connection task when it is left running to drain.
    fn stop(&self) -> Option<JoinHandle<()>> {
        let (aborted, draining) = {
            let mut state = self.inner.state();
            state.intentional = true;
            state.generation += 1;
            let was_open = state.writer.take().is_some();
            state.status = ConnectionStatus::Disconnected;
            let task = state.task.take();
            if was_open { (None, task) } else { (task, None) }
        };
        if let Some(task) = aborted {
            task.abort();
        }
        info!(url = %self.inner.config.url, "channel: disconnected");
        self.inner.emit(&Message::status(ConnectionStatus::Disconnected));
        draining
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call every listener. The state lock is released first so listeners
    /// may call back into the channel.
    fn emit(&self, message: &Message) {
        let listeners: Vec<Listener> = self.state().listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(message);
        }
    }

    /// Set the status if `generation` is still current, then announce it.
    fn transition(&self, generation: u64, status: ConnectionStatus) -> bool {
        {
            let mut state = self.state();
            if state.generation != generation {
                return false;
            }
            state.status = status;
        }
        self.emit(&Message::status(status));
        true
    }

    /// Mark the channel open and hand the queue to a fresh writer. The
    /// `connected` status goes out before the backlog is released.
    fn open(&self, generation: u64) -> Option<(VecDeque<String>, mpsc::UnboundedReceiver<String>)> {
        {
            let mut state = self.state();
            if state.generation != generation {
                return None;
            }
            state.status = ConnectionStatus::Connected;
            state.attempt = 0;
        }
        info!(url = %self.config.url, "channel: connected");
        self.emit(&Message::status(ConnectionStatus::Connected));

        let mut state = self.state();
        if state.generation != generation {
            return None;
        }
        let backlog: VecDeque<String> = state.queue.drain(..).collect();
        let (tx, rx) = mpsc::unbounded_channel();
        state.writer = Some(tx);
        debug!(flushed = backlog.len(), "channel: queue handed to writer");
        Some((backlog, rx))
    }

    /// Run one open socket until either direction ends. Returns the status
    /// to report for the close.
    async fn pump(
        &self,
        generation: u64,
        link: Link,
        mut pending: VecDeque<String>,
        mut outbox: mpsc::UnboundedReceiver<String>,
    ) -> ConnectionStatus {
        let Link { mut sink, mut stream } = link;

        let closed_with = {
            let write = async {
                loop {
                    if pending.is_empty() {
                        match outbox.recv().await {
                            Some(text) => pending.push_back(text),
                            None => break,
                        }
                    }
                    let Some(text) = pending.front().cloned() else {
                        continue;
                    };
                    if let Err(e) = sink.send(text).await {
                        warn!(error = %e, "channel: write failed");
                        return ConnectionStatus::Error;
                    }
                    pending.pop_front();
                }
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "channel: close failed");
                }
                ConnectionStatus::Disconnected
            };
            let read = async {
                while let Some(frame) = stream.next().await {
                    match frame {
                        Ok(text) => self.deliver(&text),
                        Err(e) => {
                            warn!(error = %e, "channel: read failed");
                            return ConnectionStatus::Error;
                        }
                    }
                }
                ConnectionStatus::Disconnected
            };
            tokio::select! {
                status = write => status,
                status = read => status,
            }
        };

        let mut state = self.state();
        if state.generation == generation {
            state.writer = None;
        }
        while let Ok(text) = outbox.try_recv() {
            pending.push_back(text);
        }
        if !pending.is_empty() {
            debug!(requeued = pending.len(), "channel: unsent messages requeued");
        }
        while let Some(text) = pending.pop_back() {
            state.queue.push_front(text);
        }
        closed_with
    }

    /// Decode inbound text and fan it out. One bad line never hides others.
    fn deliver(&self, text: &str) {
        for decoded in frames::decode_lines(text) {
            match decoded {
                Ok(Message::Unknown) => debug!("channel: ignoring unknown message type"),
                Ok(Message::ConnectionStatus { .. }) => debug!("channel: ignoring remote connection_status"),
                Ok(message) => self.emit(&message),
                Err(e) => warn!(error = %e, "channel: dropping malformed message"),
            }
        }
    }

    /// Count a failure and pick the next delay, or give up. Returns `None`
    /// when no retry should happen.
    fn schedule_retry(&self, generation: u64, status: ConnectionStatus) -> Option<Duration> {
        let mut state = self.state();
        if state.generation != generation || state.intentional {
            return None;
        }
        state.attempt += 1;
        let attempt = state.attempt;
        if attempt > self.config.policy.max_attempts {
            state.status = ConnectionStatus::Failed;
            drop(state);
            warn!(url = %self.config.url, attempts = attempt - 1, "channel: retries exhausted");
            self.emit(&Message::status(ConnectionStatus::Failed));
            return None;
        }
        state.status = status;
        drop(state);
        let delay = self.config.policy.delay(attempt);
        info!(attempt, ?delay, "channel: reconnect scheduled");
        self.emit(&Message::status(status));
        Some(delay)
    }
}

async fn run(inner: Arc<Inner>, generation: u64) {
    loop {
        if !inner.transition(generation, ConnectionStatus::Connecting) {
            return;
        }
        debug!(url = %inner.config.url, "channel: dialing");
        let closed_with = match inner.connector.connect(&inner.config.url).await {
            Ok(link) => {
                let Some((backlog, outbox)) = inner.open(generation) else {
                    return;
                };
                inner.pump(generation, link, backlog, outbox).await
            }
            Err(e) => {
                warn!(url = %inner.config.url, error = %e, "channel: connect failed");
                ConnectionStatus::Error
            }
        };
        let Some(delay) = inner.schedule_retry(generation, closed_with) else {
            return;
        };
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod channel_test;
