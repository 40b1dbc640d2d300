//! Server topology driver.
//!
//! ```text
//! options ──► listen address
//!                 │
//!        bind listener ──► accept loop ──► Hub ◄── router
//!                 │
//!        readiness barrier (IN + OUT)
//!                 │
//! IN  ──► forward_packets   ──► Hub Outgoing ──► router ──► peer lanes
//! OUT ◄── forward_envelopes ◄── Hub Incoming ◄── peer readers
//! ```
//!
//! Shutdown closes IN, then OUT, then every websocket peer, then joins the
//! remaining tasks.

use std::sync::Arc;

use tracing::info;
use wsbridge_core::PacketCodec;

use crate::application::barrier::ReadinessBarrier;
use crate::application::error::BridgeError;
use crate::application::forwarding::{forward_envelopes, forward_packets};
use crate::application::options::await_configuration;
use crate::application::ports::{BridgePorts, PacketSink, PacketSource};
use crate::application::shutdown::Shutdown;
use crate::domain::{BridgeSettings, ShutdownReason};
use crate::infrastructure::connection::ConnectionOptions;
use crate::infrastructure::hub::Hub;
use crate::infrastructure::lifecycle::{exit_status, reclaim, startup_outcome, TaskSet};
use crate::infrastructure::ws_server::{bind_listener, run_accept_loop};

/// Runs the multiplexing server until shutdown.
///
/// Returns `Ok(())` for a signal shutdown, including one that arrives before
/// configuration.
///
/// # Errors
///
/// Returns the fatal condition that ended the bridge: a closed options
/// port, a failed bind, a barrier timeout, or a data port disconnect.
pub async fn run_server_bridge<O, I, K>(
    ports: BridgePorts<O, I, K>,
    settings: BridgeSettings,
    shutdown: Shutdown,
) -> Result<(), BridgeError>
where
    O: PacketSource,
    I: PacketSource + 'static,
    K: PacketSink + 'static,
{
    let BridgePorts {
        mut options,
        mut input,
        mut output,
        status,
    } = ports;
    let limit = settings.shutdown_timeout();

    let address = match await_configuration(&mut options, &shutdown).await {
        Ok(address) => address,
        Err(e) => {
            options.close();
            input.close();
            output.close();
            return startup_outcome(e, &shutdown, &settings);
        }
    };

    let listener = match bind_listener(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            shutdown.trigger(ShutdownReason::Fatal(e.to_string()));
            input.close();
            output.close();
            return Err(e);
        }
    };

    let (hub, queues) = Hub::new(settings.queue_capacity, shutdown.clone());
    let mut tasks = TaskSet::new();
    tasks.spawn(
        "accept",
        run_accept_loop(
            listener,
            Arc::clone(&hub),
            ConnectionOptions::from_settings(&settings),
            shutdown.clone(),
        ),
    );
    tasks.spawn("router", Arc::clone(&hub).run_router());

    let (mut barrier, monitor) =
        ReadinessBarrier::start(settings.barrier_timeout(), status, shutdown.clone());
    tasks.push("port-monitor", monitor);

    if let Err(e) = barrier.wait().await {
        // Timeouts and interruptions have already triggered shutdown.
        shutdown.trigger(ShutdownReason::Fatal(e.to_string()));
        input.close();
        output.close();
        hub.shutdown(limit).await;
        tasks.join_all(limit).await;
        return exit_status(shutdown.reason(), &settings);
    }

    let codec = PacketCodec::multiplexed();
    let input_pump = tokio::spawn(forward_packets(
        input,
        codec,
        queues.outgoing,
        shutdown.clone(),
    ));
    let output_pump = tokio::spawn(forward_envelopes(
        queues.incoming,
        codec,
        output,
        shutdown.clone(),
    ));
    info!("server bridge running on {address}");

    let reason = shutdown.triggered().await;
    info!("stopping server bridge: {reason}");

    if let Some(mut input) = reclaim("IN pump", input_pump, limit).await {
        input.close();
    }
    if let Some(mut output) = reclaim("OUT pump", output_pump, limit).await {
        output.close();
    }
    hub.shutdown(limit).await;
    tasks.join_all(limit).await;

    exit_status(Some(reason), &settings)
}
