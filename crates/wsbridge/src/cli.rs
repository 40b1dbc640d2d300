//! Command-line arguments and logging setup shared by both binaries.
//!
//! ```text
//! wsbridge-server --port.options tcp://*:5000 --port.in tcp://*:5001 \
//!                 --port.out tcp://127.0.0.1:5002 [--debug] [--config FILE]
//! wsbridge-server --json
//! ```
//!
//! Each endpoint can also come from the environment:
//!
//! | Variable                | Flag             |
//! |-------------------------|------------------|
//! | `WSBRIDGE_PORT_OPTIONS` | `--port.options` |
//! | `WSBRIDGE_PORT_IN`      | `--port.in`      |
//! | `WSBRIDGE_PORT_OUT`     | `--port.out`     |
//!
//! CLI args take precedence when both are present.

use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::domain::{BridgeConfig, BridgeSettings, ConfigError, PortEndpoints};

/// Flags common to `wsbridge-server` and `wsbridge-client`.
#[derive(Debug, Clone, Args)]
pub struct BridgeArgs {
    /// Options port endpoint; receives the transport address at startup.
    #[arg(
        long = "port.options",
        value_name = "ENDPOINT",
        env = "WSBRIDGE_PORT_OPTIONS",
        required_unless_present = "json"
    )]
    pub options: Option<String>,

    /// Input data port endpoint (toward the websocket side).
    #[arg(
        long = "port.in",
        value_name = "ENDPOINT",
        env = "WSBRIDGE_PORT_IN",
        required_unless_present = "json"
    )]
    pub input: Option<String>,

    /// Output data port endpoint (from the websocket side).
    #[arg(
        long = "port.out",
        value_name = "ENDPOINT",
        env = "WSBRIDGE_PORT_OUT",
        required_unless_present = "json"
    )]
    pub output: Option<String>,

    /// Print the component description as JSON and exit.
    #[arg(long)]
    pub json: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long)]
    pub debug: bool,

    /// Optional TOML file with queue capacity and timeouts.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl BridgeArgs {
    /// Builds the startup configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEndpoint`] if a port endpoint is absent,
    /// or whatever [`BridgeSettings::load`] returns for `--config`.
    pub fn into_bridge_config(self) -> Result<BridgeConfig, ConfigError> {
        let endpoints = PortEndpoints {
            options: self.options.ok_or(ConfigError::MissingEndpoint("options"))?,
            input: self.input.ok_or(ConfigError::MissingEndpoint("in"))?,
            output: self.output.ok_or(ConfigError::MissingEndpoint("out"))?,
        };
        let settings = match &self.config {
            Some(path) => BridgeSettings::load(path)?,
            None => BridgeSettings::default(),
        };
        Ok(BridgeConfig {
            endpoints,
            settings,
        })
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `debug` with `--debug`, `warn` without.
pub fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
