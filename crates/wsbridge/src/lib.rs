//! wsbridge library crate.
//!
//! Bridges three message-queue ports (options, in, out) to websockets, in
//! two topologies sharing one code base.
//!
//! # Architecture
//!
//! ```text
//!                 queue ports (TCP multipart)
//!        options ──┐      in ──┐        ┌── out
//!                  ▼           ▼        │
//! [wsbridge]
//!   ├── domain/          Pure types: BridgeConfig, BridgeSettings, PortEvent,
//!   │                    ShutdownReason, Frame
//!   ├── application/     Port seams, Shutdown, readiness barrier, options
//!   │                    wait, forwarding pumps, self-description
//!   ├── infrastructure/
//!   │     ├── connection/   One websocket peer (reader + writer tasks)
//!   │     ├── hub/          CID registry, outbound routing, inbound aggregation
//!   │     ├── ws_server/    Accept loop (server topology)
//!   │     ├── ws_client/    Dial (client topology)
//!   │     ├── ports/        TCP and in-memory queue ports
//!   │     └── *_bridge      The two topology drivers
//!   └── cli/             clap arguments and logging setup
//!                  ▲
//!        websocket peers (many for the server, one for the client)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no async and no I/O.
//! - `application` depends on `domain` and `wsbridge-core`; it uses tokio
//!   channels but never opens a socket.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tokio-tungstenite`.

/// Command-line arguments and logging setup.
pub mod cli;

/// Domain layer: pure configuration and event types (no I/O).
pub mod domain;

/// Application layer: startup, readiness, and forwarding logic.
pub mod application;

/// Infrastructure layer: sockets, websockets, and the topology drivers.
pub mod infrastructure;
