//! Forwarding pumps between queue ports and the websocket side.
//!
//! ```text
//! IN port ──► forward_packets ──► EnvelopeSink   (hub Outgoing / connection)
//! EnvelopeSource ──► forward_envelopes ──► OUT port   (hub Incoming / connection)
//! ```
//!
//! Both pumps drop packets that fail validation or the codec, log them, and
//! keep going.  They end when their source closes, their destination closes,
//! or shutdown is triggered, and hand their port back to the caller so it
//! can be closed in order.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wsbridge_core::{Envelope, PacketCodec};

use crate::application::ports::{PacketSink, PacketSource, PortError};
use crate::application::shutdown::Shutdown;

/// The destination side of a pump went away.
#[derive(Debug, Error)]
#[error("{0} is closed")]
pub struct DeliveryClosed(pub &'static str);

/// Where decoded envelopes from the IN port go.
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    async fn deliver(&self, envelope: Envelope) -> Result<(), DeliveryClosed>;
}

/// Where envelopes bound for the OUT port come from.
#[async_trait]
pub trait EnvelopeSource: Send {
    /// `None` once the source is exhausted.
    async fn next_envelope(&mut self) -> Option<Envelope>;
}

#[async_trait]
impl<T> EnvelopeSink for Arc<T>
where
    T: EnvelopeSink + ?Sized,
{
    async fn deliver(&self, envelope: Envelope) -> Result<(), DeliveryClosed> {
        (**self).deliver(envelope).await
    }
}

#[async_trait]
impl EnvelopeSink for mpsc::Sender<Envelope> {
    async fn deliver(&self, envelope: Envelope) -> Result<(), DeliveryClosed> {
        self.send(envelope)
            .await
            .map_err(|_| DeliveryClosed("outgoing queue"))
    }
}

#[async_trait]
impl EnvelopeSource for mpsc::Receiver<Envelope> {
    async fn next_envelope(&mut self) -> Option<Envelope> {
        self.recv().await
    }
}

/// Pumps packets from `source` through `codec` into `sink`.
///
/// Returns the source port once the pump stops.
pub async fn forward_packets<S, T>(
    mut source: S,
    codec: PacketCodec,
    sink: T,
    shutdown: Shutdown,
) -> S
where
    S: PacketSource,
    T: EnvelopeSink,
{
    loop {
        let received = tokio::select! {
            _ = shutdown.triggered() => break,
            received = source.recv() => received,
        };
        let frames = match received {
            Ok(frames) => frames,
            Err(PortError::Closed(_)) => {
                debug!("{} port closed; input pump stopping", source.name());
                break;
            }
            Err(e) => {
                warn!("{} port receive error: {e}", source.name());
                continue;
            }
        };

        let envelope = match codec.decode_frames(frames) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("dropping packet from {} port: {e}", source.name());
                continue;
            }
        };
        debug!(cid = ?envelope.cid, "{} → websocket", source.name());

        let delivered = tokio::select! {
            _ = shutdown.triggered() => break,
            delivered = sink.deliver(envelope) => delivered,
        };
        if let Err(e) = delivered {
            debug!("input pump stopping: {e}");
            break;
        }
    }
    source
}

/// Pumps envelopes from `source` through `codec` into the `sink` port.
///
/// Returns the sink port once the pump stops.
pub async fn forward_envelopes<E, K>(
    mut source: E,
    codec: PacketCodec,
    mut sink: K,
    shutdown: Shutdown,
) -> K
where
    E: EnvelopeSource,
    K: PacketSink,
{
    loop {
        let envelope = tokio::select! {
            _ = shutdown.triggered() => break,
            envelope = source.next_envelope() => envelope,
        };
        let Some(envelope) = envelope else {
            debug!("envelope source exhausted; output pump stopping");
            break;
        };

        let packet = match codec.encode(&envelope) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(cid = ?envelope.cid, "dropping envelope: {e}");
                continue;
            }
        };
        debug!(cid = ?envelope.cid, "websocket → {}", sink.name());

        let sent = tokio::select! {
            _ = shutdown.triggered() => break,
            sent = sink.send(packet.into_frames()) => sent,
        };
        match sent {
            Ok(()) => {}
            Err(PortError::Closed(name)) => {
                debug!("{name} port closed; output pump stopping");
                break;
            }
            Err(e) => warn!("dropping envelope for {} port: {e}", sink.name()),
        }
    }
    sink
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ShutdownReason;
    use crate::infrastructure::ports::memory;
    use serde_json::json;
    use std::time::Duration;
    use wsbridge_core::{ConnectionId, QueuePacket};

    #[tokio::test]
    async fn test_malformed_packets_are_dropped_and_valid_ones_forwarded_in_order() {
        // Arrange
        let cid = ConnectionId::new();
        let (mut upstream, input) = memory::channel("IN", 8);
        let (tx, mut rx) = mpsc::channel(8);
        upstream.send(vec![b"one frame".to_vec()]).await.unwrap();
        upstream
            .send(vec![Vec::new(), b"not an envelope".to_vec()])
            .await
            .unwrap();
        for n in 0..3 {
            let raw = format!(r#"{{"cid":"{cid}","payload":{n}}}"#);
            upstream.send(vec![Vec::new(), raw.into_bytes()]).await.unwrap();
        }
        upstream.close();

        // Act
        forward_packets(input, PacketCodec::multiplexed(), tx, Shutdown::new()).await;

        // Assert
        for n in 0..3 {
            assert_eq!(rx.recv().await.unwrap(), Envelope::tagged(cid, json!(n)));
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_envelopes_reach_output_port_as_two_frame_packets() {
        // Arrange
        let cid = ConnectionId::new();
        let (tx, rx) = mpsc::channel(8);
        let (output, mut downstream) = memory::channel("OUT", 8);
        tx.send(Envelope::tagged(cid, json!("hello"))).await.unwrap();
        drop(tx);

        // Act
        forward_envelopes(rx, PacketCodec::multiplexed(), output, Shutdown::new()).await;

        // Assert
        let frames = downstream.recv().await.unwrap();
        let envelope = PacketCodec::multiplexed().decode_frames(frames).unwrap();
        assert_eq!(envelope, Envelope::tagged(cid, json!("hello")));
    }

    #[tokio::test]
    async fn test_unencodable_envelope_does_not_stop_the_pump() {
        // Arrange: a raw payload cannot be multiplexed
        let cid = ConnectionId::new();
        let (tx, rx) = mpsc::channel(8);
        let (output, mut downstream) = memory::channel("OUT", 8);
        tx.send(Envelope::untagged(b"raw".to_vec())).await.unwrap();
        tx.send(Envelope::tagged(cid, json!(1))).await.unwrap();
        drop(tx);

        // Act
        forward_envelopes(rx, PacketCodec::multiplexed(), output, Shutdown::new()).await;

        // Assert
        let packet = QueuePacket::from_frames(downstream.recv().await.unwrap()).unwrap();
        let envelope = PacketCodec::multiplexed().decode(&packet).unwrap();
        assert_eq!(envelope.cid, Some(cid));
    }

    #[tokio::test]
    async fn test_shutdown_stops_an_idle_pump_and_returns_the_port() {
        // Arrange
        let (_upstream, input) = memory::channel("IN", 1);
        let (tx, _rx) = mpsc::channel(1);
        let shutdown = Shutdown::new();
        let pump = tokio::spawn(forward_packets(
            input,
            PacketCodec::single(),
            tx,
            shutdown.clone(),
        ));

        // Act
        shutdown.trigger(ShutdownReason::Signal);

        // Assert
        let port = tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump must stop")
            .unwrap();
        assert_eq!(port.name(), "IN");
    }
}
