//! In-memory queue ports: a bounded channel with a port on each end.
//!
//! Used to embed a bridge in another program and throughout the tests.

use async_trait::async_trait;
use tokio::sync::mpsc;
use wsbridge_core::Multipart;

use crate::application::ports::{PacketSink, PacketSource, PortError};

/// Creates a connected sink/source pair named `name`.
pub fn channel(name: &str, capacity: usize) -> (MemorySink, MemorySource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        MemorySink {
            name: name.to_string(),
            tx: Some(tx),
        },
        MemorySource {
            name: name.to_string(),
            rx,
            closed: false,
        },
    )
}

#[derive(Debug)]
pub struct MemorySource {
    name: String,
    rx: mpsc::Receiver<Multipart>,
    closed: bool,
}

#[async_trait]
impl PacketSource for MemorySource {
    async fn recv(&mut self) -> Result<Multipart, PortError> {
        if self.closed {
            return Err(PortError::Closed(self.name.clone()));
        }
        self.rx
            .recv()
            .await
            .ok_or_else(|| PortError::Closed(self.name.clone()))
    }

    fn close(&mut self) {
        self.closed = true;
        self.rx.close();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub struct MemorySink {
    name: String,
    tx: Option<mpsc::Sender<Multipart>>,
}

#[async_trait]
impl PacketSink for MemorySink {
    async fn send(&mut self, frames: Multipart) -> Result<(), PortError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| PortError::Closed(self.name.clone()))?;
        tx.send(frames)
            .await
            .map_err(|_| PortError::Closed(self.name.clone()))
    }

    fn close(&mut self) {
        self.tx = None;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_pass_through_unchanged() {
        let (mut sink, mut source) = channel("IN", 2);
        sink.send(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
            .await
            .unwrap();
        assert_eq!(source.recv().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_closed_source_rejects_further_receives() {
        let (mut sink, mut source) = channel("IN", 2);
        sink.send(vec![Vec::new()]).await.unwrap();
        source.close();
        source.close();
        assert!(matches!(source.recv().await, Err(PortError::Closed(_))));
        assert!(sink.send(vec![Vec::new()]).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_sink_ends_the_source() {
        let (mut sink, mut source) = channel("OUT", 2);
        sink.close();
        assert!(matches!(source.recv().await, Err(PortError::Closed(_))));
        assert!(matches!(sink.send(Vec::new()).await, Err(PortError::Closed(_))));
    }
}
