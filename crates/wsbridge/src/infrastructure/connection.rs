//! One websocket peer: a socket, two bounded queues, a reader and a writer.
//!
//! ```text
//!            outbound (bounded)            ┌────────┐
//! send() ──────────────────────► writer ──►│        │
//!                                          │ socket │
//! take_inbound() ◄─────────────── reader ◄─│        │
//!            inbound (bounded)             └────────┘
//! ```
//!
//! # Lifecycle
//!
//! `Connecting` → `Open` → `Closing` → `Closed`.
//!
//! - [`Connection::new`] wraps a handshaken socket; nothing runs yet.
//! - [`Connection::start`] spawns the reader and writer (`Open`).
//! - A close request (explicit, peer close, or terminal read error) moves
//!   to `Closing`.  The reader stops and the writer flushes whatever is
//!   already queued within the drain window, then sends a close frame.
//! - [`Connection::close`] joins both tasks and enters `Closed`.  It is
//!   idempotent and safe to call from several tasks at once.
//!
//! # Error handling
//!
//! Read errors are classified: UTF-8 and capacity errors are transient and
//! retried with a short linear backoff, everything else ends the connection.
//! A write error ends only the writer; the reader keeps delivering until the
//! connection is closed.
//!
//! # Backpressure
//!
//! Both queues are bounded.  A full outbound queue blocks [`Connection::send`]
//! and a full inbound queue blocks the reader, which in turn stops reading
//! from the socket.  Only this connection stalls.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use wsbridge_core::{ConnectionId, Envelope};

use crate::application::forwarding::{DeliveryClosed, EnvelopeSink, EnvelopeSource};
use crate::domain::{BridgeSettings, Frame};

/// Consecutive transient read errors tolerated before giving up.
const MAX_TRANSIENT_ERRORS: u32 = 8;

const TRANSIENT_BACKOFF: Duration = Duration::from_millis(10);

/// Extra time granted to tasks beyond the drain window before aborting.
const JOIN_MARGIN: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}

/// Per-connection tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Capacity of the outbound and inbound queues.
    pub capacity: usize,
    /// How long a closing writer may keep flushing.
    pub drain_timeout: Duration,
}

impl ConnectionOptions {
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            capacity: settings.queue_capacity,
            drain_timeout: settings.drain_timeout(),
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from_settings(&BridgeSettings::default())
    }
}

type WsSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
type WsSource = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Socket halves and queue ends waiting for [`Connection::start`].
struct Pending {
    sink: WsSink,
    source: WsSource,
    outbound_rx: mpsc::Receiver<Frame>,
    inbound_tx: mpsc::Sender<Frame>,
}

/// State shared between the handle and its two tasks.
struct Signals {
    id: ConnectionId,
    state: watch::Sender<ConnectionState>,
    close_requested: watch::Sender<bool>,
}

impl Signals {
    /// Returns `true` for the call that actually requested the close.
    fn request_close(&self) -> bool {
        let first = self.close_requested.send_if_modified(|requested| {
            if *requested {
                false
            } else {
                *requested = true;
                true
            }
        });
        if first {
            self.state.send_if_modified(|state| match state {
                ConnectionState::Connecting | ConnectionState::Open => {
                    *state = ConnectionState::Closing;
                    true
                }
                _ => false,
            });
        }
        first
    }

    fn is_close_requested(&self) -> bool {
        *self.close_requested.borrow()
    }

    async fn close_requested(&self) {
        let mut rx = self.close_requested.subscribe();
        loop {
            let requested = *rx.borrow_and_update();
            if requested || rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn reached_closed(&self) {
        let mut rx = self.state.subscribe();
        loop {
            let closed = *rx.borrow_and_update() == ConnectionState::Closed;
            if closed || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A websocket peer with its own reader and writer tasks.
pub struct Connection {
    id: ConnectionId,
    signals: Arc<Signals>,
    outbound: mpsc::Sender<Frame>,
    inbound: Mutex<Option<mpsc::Receiver<Frame>>>,
    pending: Mutex<Option<Pending>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    finalizing: AtomicBool,
    drain_timeout: Duration,
}

impl Connection {
    /// Wraps a handshaken websocket.  The connection stays `Connecting`
    /// until [`Connection::start`].
    pub fn new<S>(socket: WebSocketStream<S>, options: ConnectionOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = ConnectionId::new();
        let (sink, source) = socket.split();
        let (outbound, outbound_rx) = mpsc::channel(options.capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(options.capacity.max(1));
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let (close_requested, _) = watch::channel(false);

        Self {
            id,
            signals: Arc::new(Signals {
                id,
                state,
                close_requested,
            }),
            outbound,
            inbound: Mutex::new(Some(inbound_rx)),
            pending: Mutex::new(Some(Pending {
                sink: Box::pin(sink),
                source: Box::pin(source),
                outbound_rx,
                inbound_tx,
            })),
            tasks: Mutex::new(Vec::new()),
            finalizing: AtomicBool::new(false),
            drain_timeout: options.drain_timeout,
        }
    }

    /// [`Connection::new`] followed by [`Connection::start`].
    pub fn open<S>(socket: WebSocketStream<S>, options: ConnectionOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection = Self::new(socket, options);
        connection.start();
        connection
    }

    /// Spawns the reader and writer tasks.  Does nothing if already started
    /// or already closing.
    pub fn start(&self) {
        let mut tasks = lock(&self.tasks);
        if self.signals.is_close_requested() {
            return;
        }
        let Some(pending) = lock(&self.pending).take() else {
            return;
        };

        tasks.push(tokio::spawn(read_frames(
            Arc::clone(&self.signals),
            pending.source,
            pending.inbound_tx,
        )));
        tasks.push(tokio::spawn(write_frames(
            Arc::clone(&self.signals),
            pending.sink,
            pending.outbound_rx,
            self.drain_timeout,
        )));

        self.signals.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Open;
                true
            } else {
                false
            }
        });
        debug!(cid = %self.id, "connection open");
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.signals.state.borrow()
    }

    /// Queues a frame for the peer, waiting while the outbound queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] once a close has been requested or
    /// the writer has stopped.
    pub async fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        if self.signals.is_close_requested() {
            return Err(ConnectionError::Closed(self.id));
        }
        tokio::select! {
            sent = self.outbound.send(frame) => sent.map_err(|_| ConnectionError::Closed(self.id)),
            _ = self.signals.close_requested() => Err(ConnectionError::Closed(self.id)),
        }
    }

    /// Hands out the inbound queue.  Only the first call gets it.
    pub fn take_inbound(&self) -> Option<mpsc::Receiver<Frame>> {
        lock(&self.inbound).take()
    }

    /// Resolves once a close has been requested by anyone, including the
    /// reader after a peer close.
    pub async fn closed(&self) {
        self.signals.close_requested().await;
    }

    /// Closes the connection and waits for its tasks.
    ///
    /// The first caller drives the close; concurrent and later callers wait
    /// until the connection is `Closed`.
    pub async fn close(&self) {
        self.signals.request_close();

        if self.finalizing.swap(true, Ordering::AcqRel) {
            self.signals.reached_closed().await;
            return;
        }

        // Never started: dropping the halves drops the socket.
        drop(lock(&self.pending).take());

        let handles = std::mem::take(&mut *lock(&self.tasks));
        let limit = self.drain_timeout + JOIN_MARGIN;
        for mut handle in handles {
            if tokio::time::timeout(limit, &mut handle).await.is_err() {
                warn!(cid = %self.id, "connection task still running after {limit:?}; aborting");
                handle.abort();
            }
        }

        self.signals.state.send_replace(ConnectionState::Closed);
        info!(cid = %self.id, "connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.signals.request_close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl EnvelopeSink for Connection {
    async fn deliver(&self, envelope: Envelope) -> Result<(), DeliveryClosed> {
        self.send(Frame::from_payload(envelope.payload))
            .await
            .map_err(|_| DeliveryClosed("websocket connection"))
    }
}

/// The inbound queue of a single-peer connection, read as raw envelopes.
pub struct InboundEnvelopes(pub mpsc::Receiver<Frame>);

#[async_trait]
impl EnvelopeSource for InboundEnvelopes {
    async fn next_envelope(&mut self) -> Option<Envelope> {
        self.0
            .recv()
            .await
            .map(|frame| Envelope::untagged(frame.into_bytes()))
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
        }
    }
}

/// UTF-8 and oversized-message errors affect one message, not the stream.
fn is_transient(err: &WsError) -> bool {
    matches!(err, WsError::Utf8 { .. } | WsError::Capacity(_))
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

async fn read_frames(signals: Arc<Signals>, mut source: WsSource, inbound: mpsc::Sender<Frame>) {
    let cid = signals.id;
    let mut transient_errors = 0u32;

    loop {
        let next = tokio::select! {
            biased;
            _ = signals.close_requested() => break,
            next = source.next() => next,
        };

        let frame = match next {
            Some(Ok(Message::Text(text))) => Frame::Text(text),
            Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes),
            Some(Ok(Message::Close(_))) => {
                debug!(%cid, "peer sent close");
                break;
            }
            // Pings are answered by tungstenite; pongs need nothing.
            Some(Ok(_)) => continue,
            Some(Err(e)) if is_transient(&e) && transient_errors < MAX_TRANSIENT_ERRORS => {
                transient_errors += 1;
                warn!(%cid, "transient read error ({transient_errors}/{MAX_TRANSIENT_ERRORS}): {e}");
                tokio::select! {
                    biased;
                    _ = signals.close_requested() => break,
                    _ = tokio::time::sleep(TRANSIENT_BACKOFF * transient_errors) => continue,
                }
            }
            Some(Err(e)) => {
                debug!(%cid, "read failed: {e}");
                break;
            }
            None => {
                debug!(%cid, "socket stream ended");
                break;
            }
        };
        transient_errors = 0;

        let delivered = tokio::select! {
            biased;
            _ = signals.close_requested() => false,
            sent = inbound.send(frame) => sent.is_ok(),
        };
        if !delivered {
            break;
        }
    }

    signals.request_close();
}

async fn write_frames(
    signals: Arc<Signals>,
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Frame>,
    drain_timeout: Duration,
) {
    let cid = signals.id;

    loop {
        let next = tokio::select! {
            biased;
            _ = signals.close_requested() => break,
            next = outbound.recv() => next,
        };
        let Some(frame) = next else { break };
        if let Err(e) = sink.send(frame.into()).await {
            // Write-dead, read-alive: the reader keeps going until close.
            warn!(%cid, "write failed; writer stopping: {e}");
            return;
        }
    }

    outbound.close();
    let drained = tokio::time::timeout(drain_timeout, async {
        while let Some(frame) = outbound.recv().await {
            if sink.send(frame.into()).await.is_err() {
                return;
            }
        }
        let _ = sink.close().await;
    })
    .await;
    if drained.is_err() {
        debug!(%cid, "drain window elapsed with frames still queued");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
