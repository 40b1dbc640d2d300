//! The two-frame queue packet.
//!
//! Packet layout as seen by a queue port:
//! ```text
//! frame 0: routing frame (may be empty)
//! frame 1: payload frame
//! ```
//! Anything with a different frame count is invalid and is skipped by the
//! caller before it reaches the codec.  There is no negative acknowledgement.

use thiserror::Error;

/// Raw frames exactly as a queue port delivered them.
pub type Multipart = Vec<Vec<u8>>;

/// Number of frames in a valid data packet.
pub const PACKET_FRAMES: usize = 2;

/// Errors produced when raw frames do not form a valid packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// The multipart message did not carry exactly two frames.
    #[error("invalid packet shape: expected {expected} frames, got {actual}")]
    FrameCount { expected: usize, actual: usize },
}

/// A validated queue packet: a routing frame plus a payload frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueuePacket {
    route: Vec<u8>,
    payload: Vec<u8>,
}

impl QueuePacket {
    /// Builds a data packet with an empty routing frame.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            route: Vec::new(),
            payload: payload.into(),
        }
    }

    /// Builds a packet with an explicit routing frame.
    pub fn with_route(route: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            route: route.into(),
            payload: payload.into(),
        }
    }

    /// Returns `true` when `frames` has the two-frame packet shape.
    pub fn is_valid(frames: &[Vec<u8>]) -> bool {
        frames.len() == PACKET_FRAMES
    }

    /// Validates raw frames and converts them into a packet.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::FrameCount`] when the frame count is not two.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wsbridge_core::QueuePacket;
    ///
    /// let packet = QueuePacket::from_frames(vec![Vec::new(), b"hi".to_vec()]).unwrap();
    /// assert_eq!(packet.payload(), b"hi");
    /// assert!(QueuePacket::from_frames(vec![b"hi".to_vec()]).is_err());
    /// ```
    pub fn from_frames(frames: Multipart) -> Result<Self, PacketError> {
        if !Self::is_valid(&frames) {
            return Err(PacketError::FrameCount {
                expected: PACKET_FRAMES,
                actual: frames.len(),
            });
        }
        let mut frames = frames.into_iter();
        let route = frames.next().unwrap_or_default();
        let payload = frames.next().unwrap_or_default();
        Ok(Self { route, payload })
    }

    pub fn route(&self) -> &[u8] {
        &self.route
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Converts the packet back into raw frames for a queue port.
    pub fn into_frames(self) -> Multipart {
        vec![self.route, self.payload]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
