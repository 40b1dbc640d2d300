//! Application layer for wsbridge.
//!
//! Knows *what* the bridge does between its ports and the websocket side,
//! and delegates *how* to the infrastructure layer through the
//! [`PacketSource`]/[`PacketSink`] and [`EnvelopeSource`]/[`EnvelopeSink`]
//! seams.
//!
//! # Responsibilities
//!
//! - Waiting for the transport address on the options port
//! - Gating traffic on dual port readiness (the barrier)
//! - Pumping packets through the envelope codec in both directions
//! - The shutdown signal shared by every task
//! - The `--json` self-description
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or websocket handshakes (that is infrastructure)
//! - Command-line parsing (that is `cli`)

pub mod barrier;
pub mod error;
pub mod forwarding;
pub mod options;
pub mod ports;
pub mod registry;
pub mod shutdown;

pub use barrier::{BarrierError, ReadinessBarrier};
pub use error::BridgeError;
pub use forwarding::{forward_envelopes, forward_packets, DeliveryClosed, EnvelopeSink, EnvelopeSource};
pub use options::await_configuration;
pub use ports::{BridgePorts, PacketSink, PacketSource, PortError, StatusReporter};
pub use shutdown::Shutdown;
