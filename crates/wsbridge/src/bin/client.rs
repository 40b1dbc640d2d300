//! wsbridge client: bridges one remote websocket endpoint to a pair of queue
//! ports.
//!
//! # Usage
//!
//! ```text
//! wsbridge-client --port.options <ENDPOINT> --port.in <ENDPOINT> --port.out <ENDPOINT>
//!                 [--debug] [--config <PATH>]
//! wsbridge-client --json
//! ```
//!
//! The websocket URL arrives on the options port.  Packets on the IN port
//! are sent to the peer as raw data; every frame the peer sends leaves on
//! the OUT port.  The process exits when the peer closes the connection.

use anyhow::Context;
use clap::Parser;
use tracing::info;

use wsbridge::application::registry;
use wsbridge::application::Shutdown;
use wsbridge::cli::{init_logging, BridgeArgs};
use wsbridge::infrastructure::ports::PortContext;
use wsbridge::infrastructure::{run_client_bridge, spawn_signal_listener};

/// Websocket client bridge for queue ports.
#[derive(Debug, Parser)]
#[command(name = "wsbridge-client", version)]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.bridge.json {
        println!("{}", registry::client_entry().to_json()?);
        return Ok(());
    }

    init_logging(cli.bridge.debug);
    let config = cli
        .bridge
        .into_bridge_config()
        .context("invalid configuration")?;
    info!("wsbridge client starting: {:?}", config.endpoints);

    let shutdown = Shutdown::new();
    let signals = spawn_signal_listener(shutdown.clone());

    let mut context = PortContext::new(config.settings.queue_capacity);
    let result = match context.open_bridge_ports(&config.endpoints).await {
        Ok(ports) => run_client_bridge(ports, config.settings, shutdown)
            .await
            .context("client bridge failed"),
        Err(e) => Err(e).context("cannot open queue ports"),
    };
    context.terminate();
    signals.abort();

    info!("wsbridge client stopped");
    result
}
