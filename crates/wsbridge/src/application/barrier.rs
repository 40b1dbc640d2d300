//! Startup readiness barrier.
//!
//! Traffic must not flow before both data ports are wired to their peers,
//! otherwise early packets are silently lost.  A monitor task counts
//! `connected` events from the IN and OUT ports.  When both have reported,
//! the barrier becomes `Ready`.  If the deadline passes first it becomes
//! `TimedOut` and the process shuts down.
//!
//! The monitor keeps running after the barrier resolves: a disconnect from
//! either port at any time triggers shutdown through the same [`Shutdown`]
//! handle an OS signal uses.
//!
//! ```text
//! IN  status ──┐
//!              ├──► monitor ──► ready (once) ──► ReadinessBarrier::wait
//! OUT status ──┘        └─────► disconnect ─────► Shutdown::trigger
//! ```

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::application::shutdown::Shutdown;
use crate::domain::{BarrierState, PortEvent, PortRole, ShutdownReason};

/// Number of distinct ports that must report readiness.
const REQUIRED_PORTS: usize = 2;

#[derive(Debug, Error)]
pub enum BarrierError {
    #[error("queue ports did not connect within {0:?}")]
    Timeout(Duration),

    #[error("startup interrupted: {0}")]
    Interrupted(ShutdownReason),

    #[error("port status stream ended before both ports connected")]
    StatusClosed,
}

/// One-shot gate on dual port readiness.
pub struct ReadinessBarrier {
    timeout: Duration,
    state: BarrierState,
    ready_rx: Option<oneshot::Receiver<()>>,
    shutdown: Shutdown,
}

impl ReadinessBarrier {
    /// Starts the monitor task and returns the barrier plus the monitor's
    /// handle, which the caller tracks until shutdown.
    pub fn start(
        timeout: Duration,
        events: mpsc::Receiver<PortEvent>,
        shutdown: Shutdown,
    ) -> (Self, JoinHandle<()>) {
        let (ready_tx, ready_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_ports(events, ready_tx, shutdown.clone()));
        let barrier = Self {
            timeout,
            state: BarrierState::Waiting,
            ready_rx: Some(ready_rx),
            shutdown,
        };
        (barrier, monitor)
    }

    pub fn state(&self) -> BarrierState {
        self.state
    }

    /// Waits until both ports are ready or the deadline passes.
    ///
    /// Once the barrier has resolved, further calls return the same outcome
    /// without waiting.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::Timeout`] when the deadline passes; shutdown is
    ///   triggered with [`ShutdownReason::BarrierTimeout`].
    /// - [`BarrierError::Interrupted`] when shutdown begins first.
    /// - [`BarrierError::StatusClosed`] when every status sender is gone.
    pub async fn wait(&mut self) -> Result<(), BarrierError> {
        match self.state {
            BarrierState::Ready => return Ok(()),
            BarrierState::TimedOut => return Err(BarrierError::Timeout(self.timeout)),
            BarrierState::Waiting => {}
        }
        let Some(ready_rx) = self.ready_rx.take() else {
            return Err(BarrierError::StatusClosed);
        };

        info!("waiting up to {:?} for IN and OUT ports", self.timeout);

        tokio::select! {
            outcome = tokio::time::timeout(self.timeout, ready_rx) => match outcome {
                Ok(Ok(())) => {
                    self.state = BarrierState::Ready;
                    info!("IN and OUT ports connected");
                    Ok(())
                }
                Ok(Err(_)) => match self.shutdown.reason() {
                    Some(reason) => Err(BarrierError::Interrupted(reason)),
                    None => Err(BarrierError::StatusClosed),
                },
                Err(_) => {
                    self.state = BarrierState::TimedOut;
                    error!("queue ports did not connect within {:?}", self.timeout);
                    self.shutdown.trigger(ShutdownReason::BarrierTimeout);
                    Err(BarrierError::Timeout(self.timeout))
                }
            },
            reason = self.shutdown.triggered() => Err(BarrierError::Interrupted(reason)),
        }
    }
}

async fn monitor_ports(
    mut events: mpsc::Receiver<PortEvent>,
    ready_tx: oneshot::Sender<()>,
    shutdown: Shutdown,
) {
    let mut connected: HashSet<PortRole> = HashSet::new();
    let mut ready_tx = Some(ready_tx);

    loop {
        let event = tokio::select! {
            _ = shutdown.triggered() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            debug!("port status stream ended");
            break;
        };

        if event.connected {
            if connected.insert(event.role) {
                debug!("{} port connected ({}/{REQUIRED_PORTS})", event.role, connected.len());
            }
            if connected.len() == REQUIRED_PORTS {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(());
                }
            }
        } else {
            error!("{} port disconnected; shutting down", event.role);
            shutdown.trigger(ShutdownReason::PortDisconnected(event.role));
            break;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
