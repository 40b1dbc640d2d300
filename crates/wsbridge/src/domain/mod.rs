//! Domain layer for wsbridge.
//!
//! Plain value types with no networking and no async: configuration,
//! readiness and shutdown events, and the websocket data frame.

pub mod config;
pub mod events;
pub mod frame;

pub use config::{BridgeConfig, BridgeSettings, ConfigError, PortEndpoints};
pub use events::{BarrierState, PortEvent, PortRole, ShutdownReason};
pub use frame::Frame;
