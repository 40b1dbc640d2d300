//! Integration tests for the TCP queue ports, alone and under a running
//! client bridge.
//!
//! Upstream writers and the downstream reader are plain `TcpStream`s that
//! speak the multipart framing directly.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use wsbridge::application::{PacketSink, PacketSource, Shutdown, StatusReporter};
use wsbridge::domain::{BridgeSettings, PortEndpoints, PortEvent, PortRole, ShutdownReason};
use wsbridge::infrastructure::ports::{PortContext, TcpInputPort, TcpOutputPort};
use wsbridge::infrastructure::run_client_bridge;
use wsbridge_core::{decode_multipart, encode_multipart, Multipart, WireError};

const WAIT: Duration = Duration::from_secs(2);

async fn next_event(events: &mut mpsc::Receiver<PortEvent>) -> PortEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("port must report its status")
        .expect("status stream open")
}

/// Reads one multipart message from a downstream stream.
async fn read_message(stream: &mut TcpStream) -> Multipart {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match decode_multipart(&buf) {
            Ok((frames, _)) => return frames,
            Err(WireError::InsufficientData { .. }) => {}
            Err(e) => panic!("bad framing: {e}"),
        }
        let n = tokio::time::timeout(WAIT, stream.read(&mut chunk))
            .await
            .expect("downstream must receive data")
            .unwrap();
        assert!(n > 0, "stream closed before a full message arrived");
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn write_message(stream: &mut TcpStream, frames: &[Vec<u8>]) {
    stream
        .write_all(&encode_multipart(frames).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_input_port_reports_first_and_last_upstream_writer() {
    // Arrange
    let (status_tx, mut events) = mpsc::channel(8);
    let reporter = StatusReporter::new(PortRole::Input, status_tx);
    let mut port = TcpInputPort::bind("IN", "tcp://127.0.0.1:0", 8, Some(reporter))
        .await
        .unwrap();

    // Act
    let mut first = TcpStream::connect(port.local_addr()).await.unwrap();
    assert_eq!(next_event(&mut events).await, PortEvent::connected(PortRole::Input));
    let mut second = TcpStream::connect(port.local_addr()).await.unwrap();
    write_message(&mut first, &[Vec::new(), b"from first".to_vec()]).await;
    write_message(&mut second, &[Vec::new(), b"from second".to_vec()]).await;

    let mut payloads = Vec::new();
    for _ in 0..2 {
        let frames = tokio::time::timeout(WAIT, port.recv()).await.unwrap().unwrap();
        payloads.push(frames[1].clone());
    }
    payloads.sort();
    drop(first);
    drop(second);

    // Assert: one connected event for both writers, one disconnect at the end
    assert_eq!(payloads, vec![b"from first".to_vec(), b"from second".to_vec()]);
    assert_eq!(
        next_event(&mut events).await,
        PortEvent::disconnected(PortRole::Input)
    );
}

#[tokio::test]
async fn test_output_port_keeps_retrying_until_the_reader_appears() {
    // Arrange: reserve an address with nobody listening
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);
    let (status_tx, mut events) = mpsc::channel(8);
    let reporter = StatusReporter::new(PortRole::Output, status_tx);
    let mut port =
        TcpOutputPort::connect("OUT", &format!("tcp://{addr}"), 8, Some(reporter)).unwrap();

    // Act: queue a packet, then start the reader a few retries later
    port.send(vec![b"route".to_vec(), b"queued".to_vec()])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let listener = TcpListener::bind(addr).await.unwrap();
    let (mut reader, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("output port must connect")
        .unwrap();

    // Assert
    assert_eq!(next_event(&mut events).await, PortEvent::connected(PortRole::Output));
    assert_eq!(
        read_message(&mut reader).await,
        vec![b"route".to_vec(), b"queued".to_vec()]
    );
    port.close();
}

#[tokio::test]
async fn test_malformed_endpoints_are_rejected_up_front() {
    let mut context = PortContext::new(8);
    assert!(context.bind_input("IN", "udp://127.0.0.1:1", None).await.is_err());
    assert!(context.connect_output("OUT", "tcp://no-port", None).is_err());
    context.terminate();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_bridge_over_tcp_ports_end_to_end() {
    // Arrange: an echoing websocket peer and the downstream OUT reader
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = ws_listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = socket.next().await {
            if message.is_text() || message.is_binary() {
                socket.send(message).await.unwrap();
            }
        }
    });
    let downstream = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let mut context = PortContext::new(16);
    let endpoints = PortEndpoints {
        options: "tcp://127.0.0.1:0".into(),
        input: "tcp://127.0.0.1:0".into(),
        output: format!("tcp://{}", downstream.local_addr().unwrap()),
    };
    let ports = context.open_bridge_ports(&endpoints).await.unwrap();
    let options_addr = ports.options.local_addr();
    let input_addr = ports.input.local_addr();
    let shutdown = Shutdown::new();
    let bridge = tokio::spawn(run_client_bridge(
        ports,
        BridgeSettings::default(),
        shutdown.clone(),
    ));

    // Act
    let mut options = TcpStream::connect(options_addr).await.unwrap();
    write_message(&mut options, &[Vec::new(), format!("ws://{ws_addr}/").into_bytes()]).await;
    let mut upstream = TcpStream::connect(input_addr).await.unwrap();
    let (mut reader, _) = tokio::time::timeout(WAIT, downstream.accept())
        .await
        .expect("OUT port must connect")
        .unwrap();
    write_message(&mut upstream, &[Vec::new(), b"over the wire".to_vec()]).await;

    // Assert
    let frames = read_message(&mut reader).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1], b"over the wire");

    shutdown.trigger(ShutdownReason::Signal);
    assert!(bridge.await.unwrap().is_ok());
    context.terminate();
}
