//! TCP queue ports.
//!
//! # Topology
//!
//! ```text
//! upstream writers ──tcp──► TcpInputPort (bind)     options / IN
//! TcpOutputPort (connect) ──tcp──► downstream reader   OUT
//! ```
//!
//! An input port binds its endpoint and accepts any number of upstream
//! writers; packets from all of them are merged into one bounded queue.  An
//! output port connects to its downstream reader, retrying every
//! [`RECONNECT_INTERVAL`] until it succeeds or the port is closed.
//!
//! # Binary streaming protocol
//!
//! Each packet is one multipart message in the framing of
//! [`wsbridge_core::protocol::wire`].  TCP is a *stream* protocol: a single
//! `read()` may return part of a message or several messages, so readers
//! accumulate bytes in a buffer and decode until the decoder reports
//! `InsufficientData`.
//!
//! # Connection status
//!
//! A port created with a [`StatusReporter`] emits `connected = true` when
//! its first peer attaches and `connected = false` when its last peer goes
//! away (input) or its stream fails (output).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use wsbridge_core::{decode_multipart, encode_multipart, Multipart, WireError};

use crate::application::ports::{
    BridgePorts, PacketSink, PacketSource, PortError, StatusReporter,
};
use crate::domain::{PortEndpoints, PortRole};

/// Delay between connect attempts of an output port.
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

/// Pause after a failed `accept()` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

const READ_CHUNK: usize = 4096;

/// Converts a `tcp://host:port` endpoint into a socket address string.
///
/// `*` as the host means every interface.
///
/// # Errors
///
/// Returns [`PortError::InvalidEndpoint`] for other schemes or a missing port.
pub fn parse_endpoint(endpoint: &str) -> Result<String, PortError> {
    let invalid = || PortError::InvalidEndpoint(endpoint.to_string());
    let rest = endpoint.strip_prefix("tcp://").ok_or_else(invalid)?;
    let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
    port.parse::<u16>().map_err(|_| invalid())?;
    let host = match host {
        "*" => "0.0.0.0",
        "" => return Err(invalid()),
        other => other,
    };
    Ok(format!("{host}:{port}"))
}

// ── Input port ────────────────────────────────────────────────────────────────

/// A bound port that receives packets from any number of upstream writers.
pub struct TcpInputPort {
    name: String,
    local_addr: SocketAddr,
    rx: mpsc::Receiver<Multipart>,
    accept_task: JoinHandle<()>,
    closed: bool,
}

impl TcpInputPort {
    /// Binds `endpoint` and starts accepting upstream writers.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidEndpoint`] or [`PortError::Bind`].
    pub async fn bind(
        name: &str,
        endpoint: &str,
        capacity: usize,
        status: Option<StatusReporter>,
    ) -> Result<Self, PortError> {
        let addr = parse_endpoint(endpoint)?;
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| PortError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| PortError::Bind {
            endpoint: endpoint.to_string(),
            source,
        })?;

        info!("{name} port bound on {local_addr}");

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let accept_task = tokio::spawn(accept_writers(listener, name.to_string(), tx, status));

        Ok(Self {
            name: name.to_string(),
            local_addr,
            rx,
            accept_task,
            closed: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn abort_handle(&self) -> AbortHandle {
        self.accept_task.abort_handle()
    }
}

#[async_trait]
impl PacketSource for TcpInputPort {
    async fn recv(&mut self) -> Result<Multipart, PortError> {
        if self.closed {
            return Err(PortError::Closed(self.name.clone()));
        }
        self.rx
            .recv()
            .await
            .ok_or_else(|| PortError::Closed(self.name.clone()))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Dropping the accept task's JoinSet aborts every peer reader too.
        self.accept_task.abort();
        self.rx.close();
        info!("{} port closed", self.name);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TcpInputPort {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Accept loop of an input port.
///
/// Peer readers live in a `JoinSet` owned by this task, so aborting the task
/// tears down every upstream connection with it.
async fn accept_writers(
    listener: TcpListener,
    name: String,
    tx: mpsc::Sender<Multipart>,
    status: Option<StatusReporter>,
) {
    let active = Arc::new(AtomicUsize::new(0));
    let mut peers = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("{name} port: upstream {peer} attached");
                    if active.fetch_add(1, Ordering::SeqCst) == 0 {
                        if let Some(status) = &status {
                            status.report(true).await;
                        }
                    }

                    let tx = tx.clone();
                    let name = name.clone();
                    let active = Arc::clone(&active);
                    let status = status.clone();
                    peers.spawn(async move {
                        read_packets(stream, &name, tx).await;
                        debug!("{name} port: upstream {peer} detached");
                        if active.fetch_sub(1, Ordering::SeqCst) == 1 {
                            if let Some(status) = &status {
                                status.report(false).await;
                            }
                        }
                    });
                }
                Err(e) => {
                    warn!("{name} port: accept error: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = peers.join_next(), if !peers.is_empty() => {}
        }
    }
}

/// Reads multipart messages from one upstream writer until EOF or a framing
/// violation.
async fn read_packets(mut stream: TcpStream, name: &str, tx: mpsc::Sender<Multipart>) {
    let mut recv_buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut read_tmp = vec![0u8; READ_CHUNK];

    loop {
        let n = match stream.read(&mut read_tmp).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                warn!("{name} port: read failed: {e}");
                return;
            }
        };
        recv_buf.extend_from_slice(&read_tmp[..n]);

        // One read may have delivered several messages.
        loop {
            match decode_multipart(&recv_buf) {
                Ok((frames, consumed)) => {
                    recv_buf.drain(..consumed);
                    if tx.send(frames).await.is_err() {
                        return;
                    }
                }
                Err(WireError::InsufficientData { .. }) => break,
                Err(e) => {
                    warn!("{name} port: dropping upstream after framing error: {e}");
                    return;
                }
            }
        }
    }
}

// ── Output port ───────────────────────────────────────────────────────────────

/// A port that connects to its downstream reader and sends packets to it.
pub struct TcpOutputPort {
    name: String,
    tx: Option<mpsc::Sender<Multipart>>,
    writer_task: JoinHandle<()>,
}

impl TcpOutputPort {
    /// Starts connecting to `endpoint` in the background.
    ///
    /// Packets sent before the connection is up wait in the port's queue.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidEndpoint`] for a malformed endpoint.
    pub fn connect(
        name: &str,
        endpoint: &str,
        capacity: usize,
        status: Option<StatusReporter>,
    ) -> Result<Self, PortError> {
        let addr = parse_endpoint(endpoint)?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let writer_task = tokio::spawn(write_packets(addr, name.to_string(), rx, status));
        Ok(Self {
            name: name.to_string(),
            tx: Some(tx),
            writer_task,
        })
    }

    fn abort_handle(&self) -> AbortHandle {
        self.writer_task.abort_handle()
    }
}

#[async_trait]
impl PacketSink for TcpOutputPort {
    async fn send(&mut self, frames: Multipart) -> Result<(), PortError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| PortError::Closed(self.name.clone()))?;
        tx.send(frames)
            .await
            .map_err(|_| PortError::Closed(self.name.clone()))
    }

    /// Lets the writer flush what is queued, then close the stream.
    fn close(&mut self) {
        if self.tx.take().is_some() {
            info!("{} port closed", self.name);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

async fn write_packets(
    addr: String,
    name: String,
    mut rx: mpsc::Receiver<Multipart>,
    status: Option<StatusReporter>,
) {
    let stream = loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => break stream,
            Err(e) => {
                debug!("{name} port: connect to {addr} failed: {e}; retrying");
                if rx.is_closed() {
                    return;
                }
                tokio::time::sleep(RECONNECT_INTERVAL).await;
            }
        }
    };
    let _ = stream.set_nodelay(true);
    info!("{name} port connected to {addr}");
    if let Some(status) = &status {
        status.report(true).await;
    }

    let (mut read_half, mut write_half) = stream.into_split();
    let mut scratch = [0u8; 64];

    loop {
        tokio::select! {
            frames = rx.recv() => {
                let Some(frames) = frames else { break };
                let bytes = match encode_multipart(&frames) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("{name} port: dropping packet: {e}");
                        continue;
                    }
                };
                if let Err(e) = write_half.write_all(&bytes).await {
                    warn!("{name} port: write failed: {e}");
                    if let Some(status) = &status {
                        status.report(false).await;
                    }
                    return;
                }
            }
            // The downstream reader never sends; any read result other than
            // pending means the stream is gone.
            read = read_half.read(&mut scratch) => {
                match read {
                    Ok(0) => warn!("{name} port: downstream closed the connection"),
                    Ok(_) => continue,
                    Err(e) => warn!("{name} port: connection error: {e}"),
                }
                if let Some(status) = &status {
                    status.report(false).await;
                }
                return;
            }
        }
    }

    let _ = write_half.shutdown().await;
    debug!("{name} port: writer finished");
}

// ── Port context ──────────────────────────────────────────────────────────────

/// Creates TCP ports and tears down their background I/O at the end.
pub struct PortContext {
    capacity: usize,
    tasks: Vec<(String, AbortHandle)>,
}

impl PortContext {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tasks: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// See [`TcpInputPort::bind`].
    pub async fn bind_input(
        &mut self,
        name: &str,
        endpoint: &str,
        status: Option<StatusReporter>,
    ) -> Result<TcpInputPort, PortError> {
        let port = TcpInputPort::bind(name, endpoint, self.capacity, status).await?;
        self.tasks.push((name.to_string(), port.abort_handle()));
        Ok(port)
    }

    /// # Errors
    ///
    /// See [`TcpOutputPort::connect`].
    pub fn connect_output(
        &mut self,
        name: &str,
        endpoint: &str,
        status: Option<StatusReporter>,
    ) -> Result<TcpOutputPort, PortError> {
        let port = TcpOutputPort::connect(name, endpoint, self.capacity, status)?;
        self.tasks.push((name.to_string(), port.abort_handle()));
        Ok(port)
    }

    /// Opens the options, IN, and OUT ports of one bridge process, with IN
    /// and OUT reporting their status on the returned stream.
    ///
    /// # Errors
    ///
    /// Returns the first port that fails to open.
    pub async fn open_bridge_ports(
        &mut self,
        endpoints: &PortEndpoints,
    ) -> Result<BridgePorts<TcpInputPort, TcpInputPort, TcpOutputPort>, PortError> {
        let (status_tx, status) = mpsc::channel(8);
        let options = self.bind_input("OPTIONS", &endpoints.options, None).await?;
        let input = self
            .bind_input(
                "IN",
                &endpoints.input,
                Some(StatusReporter::new(PortRole::Input, status_tx.clone())),
            )
            .await?;
        let output = self.connect_output(
            "OUT",
            &endpoints.output,
            Some(StatusReporter::new(PortRole::Output, status_tx)),
        )?;
        Ok(BridgePorts {
            options,
            input,
            output,
            status,
        })
    }

    /// Aborts whatever port I/O is still running.
    pub fn terminate(self) {
        for (name, task) in self.tasks {
            if !task.is_finished() {
                debug!("aborting {name} port I/O");
                task.abort();
            }
        }
        info!("port context terminated");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
