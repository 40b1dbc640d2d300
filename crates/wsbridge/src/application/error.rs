//! Fatal bridge errors.
//!
//! Per-message problems (bad packets, codec failures, routing misses) never
//! surface here; they are logged and dropped where they occur.  A
//! [`BridgeError`] always ends the process with a non-zero exit code.

use std::time::Duration;

use thiserror::Error;

use crate::domain::{ConfigError, PortRole, ShutdownReason};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind websocket listener on {addr}: {source}")]
    TransportBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to dial websocket {url}: {reason}")]
    TransportDial { url: String, reason: String },

    #[error("{0} port disconnected")]
    PortReadiness(PortRole),

    #[error("queue ports did not connect within {0:?}")]
    BarrierTimeout(Duration),

    #[error("websocket connection closed")]
    TransportClosed,

    #[error("{0}")]
    Fatal(String),
}

impl BridgeError {
    /// Maps a non-clean shutdown reason onto the error the driver reports.
    ///
    /// Returns `None` for a clean (signal) shutdown.
    pub fn from_shutdown(reason: ShutdownReason, barrier_timeout: Duration) -> Option<Self> {
        match reason {
            ShutdownReason::Signal => None,
            ShutdownReason::PortDisconnected(role) => Some(BridgeError::PortReadiness(role)),
            ShutdownReason::BarrierTimeout => Some(BridgeError::BarrierTimeout(barrier_timeout)),
            ShutdownReason::TransportClosed => Some(BridgeError::TransportClosed),
            ShutdownReason::Fatal(msg) => Some(BridgeError::Fatal(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_shutdown_is_not_an_error() {
        assert!(BridgeError::from_shutdown(ShutdownReason::Signal, Duration::ZERO).is_none());
    }

    #[test]
    fn test_port_disconnect_maps_to_port_readiness() {
        let err = BridgeError::from_shutdown(
            ShutdownReason::PortDisconnected(PortRole::Output),
            Duration::ZERO,
        );
        assert!(matches!(err, Some(BridgeError::PortReadiness(PortRole::Output))));
    }

    #[test]
    fn test_barrier_timeout_keeps_its_limit() {
        let err = BridgeError::from_shutdown(ShutdownReason::BarrierTimeout, Duration::from_secs(30))
            .unwrap();
        assert_eq!(err.to_string(), "queue ports did not connect within 30s");
    }
}
