//! wsbridge server: multiplexes many websocket peers over one pair of queue
//! ports.
//!
//! # Usage
//!
//! ```text
//! wsbridge-server --port.options <ENDPOINT> --port.in <ENDPOINT> --port.out <ENDPOINT>
//!                 [--debug] [--config <PATH>]
//! wsbridge-server --json
//! ```
//!
//! The listen address arrives on the options port.  Packets on the IN port
//! are JSON envelopes `{"cid": ..., "payload": ...}` addressed to a peer;
//! every frame a peer sends leaves on the OUT port tagged with its CID.

use anyhow::Context;
use clap::Parser;
use tracing::info;

use wsbridge::application::registry;
use wsbridge::application::Shutdown;
use wsbridge::cli::{init_logging, BridgeArgs};
use wsbridge::infrastructure::ports::PortContext;
use wsbridge::infrastructure::{run_server_bridge, spawn_signal_listener};

/// Websocket server bridge for queue ports.
#[derive(Debug, Parser)]
#[command(name = "wsbridge-server", version)]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.bridge.json {
        println!("{}", registry::server_entry().to_json()?);
        return Ok(());
    }

    init_logging(cli.bridge.debug);
    let config = cli
        .bridge
        .into_bridge_config()
        .context("invalid configuration")?;
    info!("wsbridge server starting: {:?}", config.endpoints);

    let shutdown = Shutdown::new();
    let signals = spawn_signal_listener(shutdown.clone());

    let mut context = PortContext::new(config.settings.queue_capacity);
    let result = match context.open_bridge_ports(&config.endpoints).await {
        Ok(ports) => run_server_bridge(ports, config.settings, shutdown)
            .await
            .context("server bridge failed"),
        Err(e) => Err(e).context("cannot open queue ports"),
    };
    context.terminate();
    signals.abort();

    info!("wsbridge server stopped");
    result
}
