//! Client topology driver.
//!
//! One websocket connection, no CIDs.  Frames from the peer go to the OUT
//! port as raw payloads; packets from the IN port go to the peer as text
//! when they are valid UTF-8 and as binary otherwise.
//!
//! The peer closing the connection ends the bridge with
//! [`ShutdownReason::TransportClosed`], after every frame it sent before the
//! close has reached the OUT port.

use std::sync::Arc;

use tracing::{info, warn};
use wsbridge_core::PacketCodec;

use crate::application::barrier::ReadinessBarrier;
use crate::application::error::BridgeError;
use crate::application::forwarding::{forward_envelopes, forward_packets};
use crate::application::options::await_configuration;
use crate::application::ports::{BridgePorts, PacketSink, PacketSource};
use crate::application::shutdown::Shutdown;
use crate::domain::{BridgeSettings, ShutdownReason};
use crate::infrastructure::connection::{Connection, ConnectionOptions, InboundEnvelopes};
use crate::infrastructure::lifecycle::{exit_status, reclaim, startup_outcome, TaskSet};
use crate::infrastructure::ws_client::dial;

/// Runs the single-connection client until shutdown.
///
/// # Errors
///
/// Returns the fatal condition that ended the bridge: a closed options
/// port, a failed dial, a barrier timeout, a data port disconnect, or the
/// peer closing the websocket.
pub async fn run_client_bridge<O, I, K>(
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

    let url = match await_configuration(&mut options, &shutdown).await {
        Ok(url) => url,
        Err(e) => {
            options.close();
            input.close();
            output.close();
            return startup_outcome(e, &shutdown, &settings);
        }
    };

    let socket = match dial(&url).await {
        Ok(socket) => socket,
        Err(e) => {
            shutdown.trigger(ShutdownReason::Fatal(e.to_string()));
            input.close();
            output.close();
            return Err(e);
        }
    };

    // Frames queue up in the socket until the barrier opens and the
    // connection is started.
    let connection = Arc::new(Connection::new(
        socket,
        ConnectionOptions::from_settings(&settings),
    ));
    let Some(inbound) = connection.take_inbound() else {
        input.close();
        output.close();
        return Err(BridgeError::Fatal("connection inbound queue already taken".into()));
    };

    let mut tasks = TaskSet::new();
    let (mut barrier, monitor) =
        ReadinessBarrier::start(settings.barrier_timeout(), status, shutdown.clone());
    tasks.push("port-monitor", monitor);

    if let Err(e) = barrier.wait().await {
        shutdown.trigger(ShutdownReason::Fatal(e.to_string()));
        input.close();
        output.close();
        connection.close().await;
        tasks.join_all(limit).await;
        return exit_status(shutdown.reason(), &settings);
    }

    connection.start();
    let codec = PacketCodec::single();
    let mut output_pump = Some(tokio::spawn(forward_envelopes(
        InboundEnvelopes(inbound),
        codec,
        output,
        shutdown.clone(),
    )));
    let input_pump = tokio::spawn(forward_packets(
        input,
        codec,
        Arc::clone(&connection),
        shutdown.clone(),
    ));
    info!(cid = %connection.id(), "client bridge connected to {url}");

    let peer_closed = tokio::select! {
        _ = shutdown.triggered() => false,
        _ = connection.closed() => true,
    };
    let mut drained = None;
    if peer_closed {
        warn!("websocket peer closed the connection");
        // The reader has dropped its end of the inbound queue, so the pump
        // stops by itself once the peer's last frames are on OUT.
        if let Some(handle) = output_pump.take() {
            drained = reclaim("OUT pump", handle, limit).await;
        }
        shutdown.trigger(ShutdownReason::TransportClosed);
    }
    let reason = shutdown.triggered().await;
    info!("stopping client bridge: {reason}");

    if let Some(mut input) = reclaim("IN pump", input_pump, limit).await {
        input.close();
    }
    let output = match output_pump {
        Some(handle) => reclaim("OUT pump", handle, limit).await,
        None => drained,
    };
    if let Some(mut output) = output {
        output.close();
    }
    connection.close().await;
    tasks.join_all(limit).await;

    exit_status(Some(reason), &settings)
}
