//! Reconnecting live-feed consumer.
//!
//! One background task owns the connection. It dials, pumps frames into the
//! [`EventBuffer`], and on any loss marks the feed closed, waits the fixed
//! reconnect delay and dials again, forever. The handle returned by
//! [`StreamConsumer::activate`] owns the task: deactivating or dropping it
//! cancels the pending wait or read and closes the socket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::buffer::EventBuffer;
use super::message::parse_frame;
use super::transport::{FeedConnection, FeedConnector, WebSocketConnector};
use super::types::{ConnectionState, FeedStats, Frame, StreamConfig};
use crate::error::Error;
use crate::types::Event;

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    dropped_while_paused: AtomicU64,
    discarded: AtomicU64,
    connect_attempts: AtomicU64,
}

/// State shared between the handle and the connection task
#[derive(Debug)]
struct Shared {
    buffer: watch::Sender<EventBuffer>,
    state: watch::Sender<ConnectionState>,
    paused: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Route one text frame. Stale frames after teardown are ignored.
    fn ingest(&self, text: &str, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        if self.paused.load(Ordering::SeqCst) {
            self.counters
                .dropped_while_paused
                .fetch_add(1, Ordering::Relaxed);
            return;
        }
        match parse_frame(text) {
            Ok(event) => {
                self.buffer.send_modify(|buffer| {
                    buffer.push(event);
                });
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(reason) => {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(%reason, "discarding live feed message");
            }
        }
    }
}

/// How a connection ended
enum Disconnect {
    Remote,
    Failed(Error),
    Cancelled,
}

/// Handle to an active live-feed consumer
pub struct StreamConsumer {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamConsumer {
    /// Start consuming over WebSocket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate(config: StreamConfig) -> Self {
        Self::activate_with(config, Arc::new(WebSocketConnector::new()))
    }

    /// Start consuming with a custom connector
    pub fn activate_with(config: StreamConfig, connector: Arc<dyn FeedConnector>) -> Self {
        let (buffer, _) = watch::channel(EventBuffer::new(config.capacity));
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            buffer,
            state,
            paused: AtomicBool::new(false),
            counters: Counters::default(),
        });
        let cancel = CancellationToken::new();

        info!(url = %config.url, "activating live feed consumer");
        let task = tokio::spawn(run(config, connector, shared.clone(), cancel.clone()));

        Self {
            shared,
            cancel,
            task: Some(task),
        }
    }

    /// Buffered events, newest first
    pub fn events(&self) -> Vec<Event> {
        self.shared.buffer.borrow().to_vec()
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.shared.buffer.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.buffer.borrow().is_empty()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Gate the buffer. Applies from the next inbound message; events already
    /// buffered stay.
    pub fn set_paused(&self, paused: bool) {
        let previous = self.shared.paused.swap(paused, Ordering::SeqCst);
        if previous != paused {
            debug!(paused, "live feed pause flag changed");
        }
    }

    /// Watch the buffer for changes
    pub fn subscribe_events(&self) -> watch::Receiver<EventBuffer> {
        self.shared.buffer.subscribe()
    }

    /// Watch the connection state
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn stats(&self) -> FeedStats {
        let counters = &self.shared.counters;
        FeedStats {
            accepted: counters.accepted.load(Ordering::Relaxed),
            dropped_while_paused: counters.dropped_while_paused.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            connect_attempts: counters.connect_attempts.load(Ordering::Relaxed),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the consumer and wait for the connection task to exit.
    ///
    /// Cancels a pending reconnect, sends a close frame on an open
    /// connection and clears the buffer. Once this returns no further
    /// connection is attempted.
    pub async fn deactivate(mut self) {
        self.release();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "live feed task ended abnormally");
            }
        }
        info!("live feed consumer deactivated");
    }

    fn release(&self) {
        self.cancel.cancel();
        self.shared.set_state(ConnectionState::Closed);
        self.shared.buffer.send_modify(EventBuffer::clear);
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.release();
            task.abort();
        }
    }
}

async fn run(
    config: StreamConfig,
    connector: Arc<dyn FeedConnector>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        shared.set_state(ConnectionState::Connecting);
        let attempt = shared
            .counters
            .connect_attempts
            .fetch_add(1, Ordering::Relaxed)
            + 1;

        let dialed = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            dialed = connector.connect(&config.url) => dialed,
        };

        match dialed {
            Ok(mut connection) => {
                if cancel.is_cancelled() {
                    connection.close().await;
                    break;
                }
                shared.set_state(ConnectionState::Open);
                info!(attempt, url = %config.url, "live feed connected");

                match pump(connection.as_mut(), &shared, &cancel).await {
                    Disconnect::Cancelled => {
                        connection.close().await;
                        break;
                    }
                    Disconnect::Remote => info!("live feed closed by server"),
                    Disconnect::Failed(e) => warn!(error = %e, "live feed connection lost"),
                }
            }
            Err(e) => warn!(attempt, error = %e, "live feed connection failed"),
        }

        shared.set_state(ConnectionState::Closed);
        debug!(
            delay_ms = config.reconnect_delay.as_millis() as u64,
            "scheduling live feed reconnect"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }

    shared.set_state(ConnectionState::Closed);
    shared.buffer.send_modify(EventBuffer::clear);
}

async fn pump(
    connection: &mut dyn FeedConnection,
    shared: &Shared,
    cancel: &CancellationToken,
) -> Disconnect {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Disconnect::Cancelled,
            frame = connection.next_frame() => frame,
        };

        match frame {
            None | Some(Ok(Frame::Close)) => return Disconnect::Remote,
            Some(Err(e)) => return Disconnect::Failed(e),
            Some(Ok(Frame::Text(text))) => shared.ingest(&text, cancel),
            Some(Ok(Frame::Binary(_))) => {
                shared.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!("discarding binary live feed frame");
            }
        }
    }
}
