//! Startup configuration from the options port.
//!
//! The options port delivers exactly one useful packet: a two-frame packet
//! whose payload frame is the transport address (listen address for the
//! server, URL for the client).  Invalid packets are skipped without reply.
//! The port is closed as soon as the first valid packet has been taken.

use tracing::{debug, info, warn};
use wsbridge_core::QueuePacket;

use crate::application::ports::{PacketSource, PortError};
use crate::application::shutdown::Shutdown;
use crate::domain::ConfigError;

/// Waits for the transport address on `port`, then closes the port.
///
/// # Errors
///
/// - [`ConfigError::OptionsClosed`] if the port closes first.
/// - [`ConfigError::Interrupted`] if shutdown is triggered first.
pub async fn await_configuration<P: PacketSource>(
    port: &mut P,
    shutdown: &Shutdown,
) -> Result<String, ConfigError> {
    info!("waiting for configuration on {} port", port.name());

    loop {
        let received = tokio::select! {
            _ = shutdown.triggered() => return Err(ConfigError::Interrupted),
            received = port.recv() => received,
        };

        let frames = match received {
            Ok(frames) => frames,
            Err(PortError::Closed(_)) => return Err(ConfigError::OptionsClosed),
            Err(e) => {
                warn!("options port receive error: {e}");
                continue;
            }
        };

        let packet = match QueuePacket::from_frames(frames) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("skipping options packet: {e}");
                continue;
            }
        };

        match parse_address(packet.payload()) {
            Some(address) => {
                port.close();
                info!("configuration received: {address}");
                return Ok(address);
            }
            None => warn!("skipping options packet without a usable address"),
        }
    }
}

fn parse_address(payload: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(payload).ok()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::PacketSink;
    use crate::domain::ShutdownReason;
    use crate::infrastructure::ports::memory;

    #[tokio::test]
    async fn test_first_valid_packet_wins_and_port_is_closed() {
        // Arrange
        let (mut upstream, mut options) = memory::channel("OPTIONS", 8);
        upstream.send(vec![b"bad".to_vec()]).await.unwrap();
        upstream.send(vec![Vec::new(), Vec::new()]).await.unwrap();
        upstream
            .send(vec![Vec::new(), b"localhost:9999".to_vec()])
            .await
            .unwrap();
        upstream
            .send(vec![Vec::new(), b"localhost:1".to_vec()])
            .await
            .unwrap();

        // Act
        let address = await_configuration(&mut options, &Shutdown::new())
            .await
            .unwrap();

        // Assert: later packets are discarded with the closed port
        assert_eq!(address, "localhost:9999");
        assert!(matches!(options.recv().await, Err(PortError::Closed(_))));
    }

    #[tokio::test]
    async fn test_address_whitespace_is_trimmed() {
        let (mut upstream, mut options) = memory::channel("OPTIONS", 1);
        upstream
            .send(vec![Vec::new(), b" ws://example.test/ \n".to_vec()])
            .await
            .unwrap();
        let address = await_configuration(&mut options, &Shutdown::new())
            .await
            .unwrap();
        assert_eq!(address, "ws://example.test/");
    }

    #[tokio::test]
    async fn test_port_closed_before_configuration_is_an_error() {
        let (mut upstream, mut options) = memory::channel("OPTIONS", 1);
        upstream.close();
        let result = await_configuration(&mut options, &Shutdown::new()).await;
        assert!(matches!(result, Err(ConfigError::OptionsClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_the_wait() {
        // Arrange: a port that never delivers anything
        let (_upstream, mut options) = memory::channel("OPTIONS", 1);
        let shutdown = Shutdown::new();
        shutdown.trigger(ShutdownReason::Signal);

        // Act
        let result = await_configuration(&mut options, &shutdown).await;

        // Assert
        assert!(matches!(result, Err(ConfigError::Interrupted)));
    }
}
