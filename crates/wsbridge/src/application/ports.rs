//! Queue port seams.
//!
//! Drivers only ever see these traits; concrete TCP and in-memory ports live
//! in the infrastructure layer.  A port yields or accepts a [`Multipart`]
//! exactly as the wire carried it; validating the two-frame packet shape is
//! the caller's job.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use wsbridge_core::{Multipart, WireError};

use crate::domain::{PortEvent, PortRole};

/// Errors raised by queue ports.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("invalid endpoint `{0}`: expected tcp://host:port")]
    InvalidEndpoint(String),

    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The port was closed locally or its transport is gone.
    #[error("{0} port is closed")]
    Closed(String),

    #[error("cannot frame packet: {0}")]
    Wire(#[from] WireError),
}

/// A port that receives packets (options, in).
#[async_trait]
pub trait PacketSource: Send {
    /// Waits for the next multipart message.
    ///
    /// Returns [`PortError::Closed`] once the port is closed.
    async fn recv(&mut self) -> Result<Multipart, PortError>;

    /// Stops receiving.  Idempotent.
    fn close(&mut self);

    fn name(&self) -> &str;
}

/// A port that sends packets (out).
#[async_trait]
pub trait PacketSink: Send {
    async fn send(&mut self, frames: Multipart) -> Result<(), PortError>;

    /// Flushes what can be flushed and stops sending.  Idempotent.
    fn close(&mut self);

    fn name(&self) -> &str;
}

/// Connection-status callback handed to a data port.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    role: PortRole,
    tx: mpsc::Sender<PortEvent>,
}

impl StatusReporter {
    pub fn new(role: PortRole, tx: mpsc::Sender<PortEvent>) -> Self {
        Self { role, tx }
    }

    pub fn role(&self) -> PortRole {
        self.role
    }

    pub async fn report(&self, connected: bool) {
        let event = PortEvent {
            role: self.role,
            connected,
        };
        // Nobody listening means the barrier is gone; nothing to do.
        let _ = self.tx.send(event).await;
    }
}

/// The three queue ports of one bridge process plus their status stream.
pub struct BridgePorts<O, I, K> {
    pub options: O,
    pub input: I,
    pub output: K,
    pub status: mpsc::Receiver<PortEvent>,
}
