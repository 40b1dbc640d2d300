//! Infrastructure layer for wsbridge.
//!
//! Everything that touches the network or the OS lives here: TCP queue
//! ports, websocket connections and the hub that multiplexes them, the
//! websocket listener and dialer, signal handling, and the two topology
//! drivers that wire it all together.

pub mod client_bridge;
pub mod connection;
pub mod hub;
pub mod lifecycle;
pub mod ports;
pub mod server_bridge;
pub mod ws_client;
pub mod ws_server;

pub use client_bridge::run_client_bridge;
pub use connection::{Connection, ConnectionError, ConnectionOptions, ConnectionState};
pub use hub::{Hub, HubQueues, RoutingError};
pub use lifecycle::{spawn_signal_listener, TaskSet};
pub use server_bridge::run_server_bridge;
