//! Envelope codec: converts between [`Envelope`] and [`QueuePacket`].
//!
//! Multiplexed mode (server topology), payload frame:
//! ```text
//! {"cid":"<uuid>","payload":<json value>}
//! ```
//! Single mode (client topology): the payload frame is the raw peer data.
//!
//! In both modes the routing frame of an encoded packet is empty.  The codec
//! is pure; callers log and drop packets that fail to encode or decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::protocol::envelope::{ConnectionId, Envelope, Payload};
use crate::protocol::packet::{Multipart, PacketError, QueuePacket};

/// Selects how payload frames are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecMode {
    /// JSON envelopes tagged with a CID (many peers over one port pair).
    Multiplexed,
    /// Raw passthrough, no CID (exactly one peer).
    Single,
}

/// Errors that can occur while encoding an envelope.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A multiplexed envelope was missing its CID.
    #[error("multiplexed envelope has no CID")]
    MissingCid,

    /// A single-mode envelope carried a CID.
    #[error("single-mode envelope must not carry a CID (got {0})")]
    UnexpectedCid(ConnectionId),

    /// A multiplexed envelope carried raw bytes instead of a JSON value.
    #[error("multiplexed envelope payload is not structured JSON")]
    UnstructuredPayload,

    /// The JSON serializer rejected the envelope.
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that can occur while decoding a packet.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The raw frames did not form a two-frame packet.
    #[error(transparent)]
    InvalidPacket(#[from] PacketError),

    /// The payload frame is not a valid multiplexed envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
}

#[derive(Serialize)]
struct WireEnvelopeRef<'a> {
    cid: &'a ConnectionId,
    payload: &'a Value,
}

#[derive(Deserialize)]
struct WireEnvelope {
    cid: String,
    #[serde(default)]
    payload: Value,
}

/// Stateless envelope codec for one bridge topology.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use wsbridge_core::{ConnectionId, Envelope, PacketCodec};
///
/// let codec = PacketCodec::multiplexed();
/// let envelope = Envelope::tagged(ConnectionId::new(), json!("hello"));
/// let packet = codec.encode(&envelope).unwrap();
/// assert_eq!(codec.decode(&packet).unwrap(), envelope);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketCodec {
    mode: CodecMode,
}

impl PacketCodec {
    pub const fn new(mode: CodecMode) -> Self {
        Self { mode }
    }

    pub const fn multiplexed() -> Self {
        Self::new(CodecMode::Multiplexed)
    }

    pub const fn single() -> Self {
        Self::new(CodecMode::Single)
    }

    pub fn mode(&self) -> CodecMode {
        self.mode
    }

    /// Encodes an envelope into a two-frame packet.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the envelope does not fit the active mode
    /// or cannot be serialized.
    pub fn encode(&self, envelope: &Envelope) -> Result<QueuePacket, EncodeError> {
        match self.mode {
            CodecMode::Multiplexed => {
                let cid = envelope.cid.as_ref().ok_or(EncodeError::MissingCid)?;
                let payload = match &envelope.payload {
                    Payload::Json(value) => value,
                    Payload::Raw(_) => return Err(EncodeError::UnstructuredPayload),
                };
                let bytes = serde_json::to_vec(&WireEnvelopeRef { cid, payload })?;
                Ok(QueuePacket::new(bytes))
            }
            CodecMode::Single => {
                if let Some(cid) = envelope.cid {
                    return Err(EncodeError::UnexpectedCid(cid));
                }
                let bytes = match &envelope.payload {
                    Payload::Raw(bytes) => bytes.clone(),
                    Payload::Json(value) => serde_json::to_vec(value)?,
                };
                Ok(QueuePacket::new(bytes))
            }
        }
    }

    /// Decodes a validated packet into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedEnvelope`] in multiplexed mode when the
    /// payload frame is not a `{cid, payload}` JSON object with a string CID.
    /// Single mode never fails.
    ///
    /// A CID string that is not one of ours decodes to an envelope without a
    /// CID, which the hub counts as a routing miss.
    pub fn decode(&self, packet: &QueuePacket) -> Result<Envelope, DecodeError> {
        match self.mode {
            CodecMode::Multiplexed => {
                let wire: WireEnvelope = serde_json::from_slice(packet.payload())
                    .map_err(DecodeError::MalformedEnvelope)?;
                Ok(Envelope {
                    cid: wire.cid.parse().ok(),
                    payload: Payload::Json(wire.payload),
                })
            }
            CodecMode::Single => Ok(Envelope::untagged(packet.payload().to_vec())),
        }
    }

    /// Applies the packet validity predicate and decodes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidPacket`] for a wrong frame count, or any
    /// error [`PacketCodec::decode`] can return.
    pub fn decode_frames(&self, frames: Multipart) -> Result<Envelope, DecodeError> {
        let packet = QueuePacket::from_frames(frames)?;
        self.decode(&packet)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
