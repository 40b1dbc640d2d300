//! End-to-end tests for the server topology.
//!
//! The queue ports are in-memory; the websocket side uses real localhost
//! sockets and `tokio_tungstenite::connect_async` peers.
//!
//! ```text
//! test ──options──► ┐
//! test ──IN───────► │ run_server_bridge ◄──ws──► peer A
//! test ◄──OUT────── ┘                   ◄──ws──► peer B
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use wsbridge::application::{BridgeError, BridgePorts, PacketSink, PacketSource, Shutdown};
use wsbridge::domain::{BridgeSettings, PortEvent, PortRole, ShutdownReason};
use wsbridge::infrastructure::ports::memory::{self, MemorySink, MemorySource};
use wsbridge::infrastructure::run_server_bridge;
use wsbridge_core::{ConnectionId, Envelope, PacketCodec, Payload};

type Peer = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The test's ends of the three queue ports plus the status stream.
struct Harness {
    options: MemorySink,
    input: MemorySink,
    output: MemorySource,
    status: mpsc::Sender<PortEvent>,
    shutdown: Shutdown,
    bridge: JoinHandle<Result<(), BridgeError>>,
}

fn start_bridge(settings: BridgeSettings) -> Harness {
    let (options, options_port) = memory::channel("OPTIONS", 4);
    let (input, input_port) = memory::channel("IN", 16);
    let (output_port, output) = memory::channel("OUT", 16);
    let (status, status_rx) = mpsc::channel(8);
    let shutdown = Shutdown::new();

    let ports = BridgePorts {
        options: options_port,
        input: input_port,
        output: output_port,
        status: status_rx,
    };
    let bridge = tokio::spawn(run_server_bridge(ports, settings, shutdown.clone()));

    Harness {
        options,
        input,
        output,
        status,
        shutdown,
        bridge,
    }
}

fn free_local_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

async fn configure_and_open(harness: &mut Harness, addr: &str) {
    harness
        .options
        .send(vec![Vec::new(), addr.as_bytes().to_vec()])
        .await
        .unwrap();
    for role in [PortRole::Input, PortRole::Output] {
        harness.status.send(PortEvent::connected(role)).await.unwrap();
    }
}

/// Retries until the bridge has bound its listener.
async fn connect_peer(addr: &str) -> Peer {
    let url = format!("ws://{addr}/");
    for _ in 0..100 {
        if let Ok((peer, _)) = connect_async(url.as_str()).await {
            return peer;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("bridge never accepted a websocket connection on {addr}");
}

async fn next_envelope(output: &mut MemorySource) -> Envelope {
    let frames = tokio::time::timeout(Duration::from_secs(2), output.recv())
        .await
        .expect("OUT port must receive a packet")
        .unwrap();
    PacketCodec::multiplexed().decode_frames(frames).unwrap()
}

async fn next_text(peer: &mut Peer) -> String {
    match tokio::time::timeout(Duration::from_secs(2), peer.next())
        .await
        .expect("peer must receive a frame")
    {
        Some(Ok(Message::Text(text))) => text,
        other => panic!("unexpected frame: {other:?}"),
    }
}

/// Sends `text` from `peer` and returns the CID the bridge tagged it with.
async fn identify(peer: &mut Peer, output: &mut MemorySource, text: &str) -> ConnectionId {
    peer.send(Message::Text(text.to_string())).await.unwrap();
    let envelope = next_envelope(output).await;
    assert_eq!(envelope.payload, Payload::Json(json!(text)));
    envelope.cid.expect("server envelopes carry a CID")
}

async fn push_to_peer(input: &mut MemorySink, cid: ConnectionId, payload: serde_json::Value) {
    let packet = PacketCodec::multiplexed()
        .encode(&Envelope::tagged(cid, payload))
        .unwrap();
    input.send(packet.into_frames()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_peers_are_multiplexed_by_cid() {
    // Arrange
    let addr = free_local_addr();
    let mut harness = start_bridge(BridgeSettings::default());
    configure_and_open(&mut harness, &addr).await;
    let mut peer_a = connect_peer(&addr).await;
    let mut peer_b = connect_peer(&addr).await;

    // Act: A speaks first, then B
    let cid_a = identify(&mut peer_a, &mut harness.output, "hello").await;
    let cid_b = identify(&mut peer_b, &mut harness.output, "from b").await;
    push_to_peer(&mut harness.input, cid_b, json!("world")).await;

    // Assert
    assert_ne!(cid_a, cid_b);
    assert_eq!(next_text(&mut peer_b).await, "world");
    let nothing = tokio::time::timeout(Duration::from_millis(200), peer_a.next()).await;
    assert!(nothing.is_err(), "A must not see B's traffic");

    harness.shutdown.trigger(ShutdownReason::Signal);
    assert!(harness.bridge.await.unwrap().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_structured_payloads_are_sent_as_compact_json() {
    // Arrange
    let addr = free_local_addr();
    let mut harness = start_bridge(BridgeSettings::default());
    configure_and_open(&mut harness, &addr).await;
    let mut peer = connect_peer(&addr).await;
    let cid = identify(&mut peer, &mut harness.output, "hi").await;

    // Act
    push_to_peer(&mut harness.input, cid, json!({"n": 1})).await;

    // Assert
    assert_eq!(next_text(&mut peer).await, r#"{"n":1}"#);

    harness.shutdown.trigger(ShutdownReason::Signal);
    harness.bridge.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_packets_and_unknown_cids_do_not_disturb_live_peers() {
    // Arrange
    let addr = free_local_addr();
    let mut harness = start_bridge(BridgeSettings::default());
    configure_and_open(&mut harness, &addr).await;
    let mut peer = connect_peer(&addr).await;
    let cid = identify(&mut peer, &mut harness.output, "hi").await;

    // Act: a one-frame packet, a non-envelope, a stranger's CID, then a good one
    harness.input.send(vec![b"lonely".to_vec()]).await.unwrap();
    harness
        .input
        .send(vec![Vec::new(), b"{not json".to_vec()])
        .await
        .unwrap();
    push_to_peer(&mut harness.input, ConnectionId::new(), json!("lost")).await;
    push_to_peer(&mut harness.input, cid, json!("delivered")).await;

    // Assert
    assert_eq!(next_text(&mut peer).await, "delivered");

    harness.shutdown.trigger(ShutdownReason::Signal);
    harness.bridge.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_signal_shutdown_closes_websocket_peers() {
    // Arrange
    let addr = free_local_addr();
    let mut harness = start_bridge(BridgeSettings::default());
    configure_and_open(&mut harness, &addr).await;
    let mut peer = connect_peer(&addr).await;
    identify(&mut peer, &mut harness.output, "hi").await;

    // Act
    harness.shutdown.trigger(ShutdownReason::Signal);
    let result = harness.bridge.await.unwrap();

    // Assert: the peer sees a close frame or the end of the stream
    assert!(result.is_ok());
    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match peer.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "peer must observe the close");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_output_port_disconnect_ends_the_bridge_with_an_error() {
    // Arrange
    let addr = free_local_addr();
    let mut harness = start_bridge(BridgeSettings::default());
    configure_and_open(&mut harness, &addr).await;
    let _peer = connect_peer(&addr).await;

    // Act
    harness
        .status
        .send(PortEvent::disconnected(PortRole::Output))
        .await
        .unwrap();

    // Assert
    let result = tokio::time::timeout(Duration::from_secs(5), harness.bridge)
        .await
        .expect("bridge must stop")
        .unwrap();
    assert!(matches!(
        result,
        Err(BridgeError::PortReadiness(PortRole::Output))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_barrier_timeout_is_fatal() {
    // Arrange: only the IN port ever reports
    let settings = BridgeSettings {
        barrier_timeout_secs: 3,
        ..BridgeSettings::default()
    };
    let mut harness = start_bridge(settings);
    harness
        .options
        .send(vec![Vec::new(), b"127.0.0.1:0".to_vec()])
        .await
        .unwrap();
    harness
        .status
        .send(PortEvent::connected(PortRole::Input))
        .await
        .unwrap();

    // Act
    let result = harness.bridge.await.unwrap();

    // Assert
    assert!(matches!(result, Err(BridgeError::BarrierTimeout(limit)) if limit == Duration::from_secs(3)));
    assert_eq!(harness.shutdown.reason(), Some(ShutdownReason::BarrierTimeout));
}

#[tokio::test]
async fn test_signal_before_configuration_is_a_clean_exit() {
    // Arrange
    let harness = start_bridge(BridgeSettings::default());

    // Act
    harness.shutdown.trigger(ShutdownReason::Signal);

    // Assert
    assert!(harness.bridge.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_closed_options_port_is_a_configuration_error() {
    // Arrange
    let mut harness = start_bridge(BridgeSettings::default());

    // Act
    harness.options.close();

    // Assert
    let result = harness.bridge.await.unwrap();
    assert!(matches!(result, Err(BridgeError::Config(_))));
}

#[tokio::test]
async fn test_unusable_listen_address_is_fatal() {
    // Arrange
    let mut harness = start_bridge(BridgeSettings::default());

    // Act
    harness
        .options
        .send(vec![Vec::new(), b"definitely not an address".to_vec()])
        .await
        .unwrap();

    // Assert
    let result = harness.bridge.await.unwrap();
    assert!(matches!(result, Err(BridgeError::TransportBind { .. })));
}
