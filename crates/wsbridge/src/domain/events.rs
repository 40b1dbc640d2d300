//! Readiness and shutdown events.
//!
//! Queue ports report their connection status as [`PortEvent`]s; the
//! readiness barrier folds them into a [`BarrierState`].  Anything that ends
//! the process does so by recording a [`ShutdownReason`].

use std::fmt;

/// The two data ports whose readiness gates traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    Input,
    Output,
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRole::Input => f.write_str("IN"),
            PortRole::Output => f.write_str("OUT"),
        }
    }
}

/// A connection-status change reported by a data port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortEvent {
    pub role: PortRole,
    pub connected: bool,
}

impl PortEvent {
    pub fn connected(role: PortRole) -> Self {
        Self {
            role,
            connected: true,
        }
    }

    pub fn disconnected(role: PortRole) -> Self {
        Self {
            role,
            connected: false,
        }
    }
}

/// Startup barrier progress.
///
/// `Waiting` → `Ready` when both ports are connected, `Waiting` → `TimedOut`
/// when the deadline passes first.  Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    Waiting,
    Ready,
    TimedOut,
}

/// Why the process is shutting down.  The first recorded reason wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / SIGTERM / Ctrl+C.
    Signal,
    /// A data port reported a disconnect.
    PortDisconnected(PortRole),
    /// The readiness barrier deadline passed.
    BarrierTimeout,
    /// The client's only websocket peer went away.
    TransportClosed,
    Fatal(String),
}

impl ShutdownReason {
    /// Only an operator-requested stop is a clean exit.
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownReason::Signal)
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal => f.write_str("termination signal"),
            ShutdownReason::PortDisconnected(role) => write!(f, "{role} port disconnected"),
            ShutdownReason::BarrierTimeout => f.write_str("port readiness timeout"),
            ShutdownReason::TransportClosed => f.write_str("websocket connection closed"),
            ShutdownReason::Fatal(msg) => write!(f, "fatal error: {msg}"),
        }
    }
}
