//! Protocol module containing the packet model, wire framing, and envelope codec.

pub mod codec;
pub mod envelope;
pub mod packet;
pub mod wire;

pub use codec::{CodecMode, DecodeError, EncodeError, PacketCodec};
pub use envelope::{ConnectionId, Envelope, Payload};
pub use packet::{Multipart, PacketError, QueuePacket, PACKET_FRAMES};
pub use wire::{decode_multipart, encode_multipart, WireError, MAX_FRAMES, MAX_FRAME_LEN};
