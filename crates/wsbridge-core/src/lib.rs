//! # wsbridge-core
//!
//! Shared library for the wsbridge programs: the queue packet model, the
//! multipart wire framing used by the TCP queue ports, and the envelope codec
//! that multiplexes many websocket peers over one pair of queue ports.
//!
//! This crate is used by both the server and the client topology.
//! It has zero dependencies on sockets, async runtimes, or logging setup.
//!
//! # Architecture overview
//!
//! A bridge process owns three queue ports (options, in, out) and one or more
//! websocket connections.  Everything that crosses a queue port is a
//! *multipart packet*: an ordered list of byte frames.  A valid data packet
//! has exactly two frames, a routing frame and a payload frame.
//!
//! - **`protocol::packet`** – the two-frame [`QueuePacket`] and the validity
//!   predicate applied before any packet is used.
//! - **`protocol::wire`** – how a multipart packet is laid out on a TCP
//!   stream, with a streaming decoder that reports partial buffers.
//! - **`protocol::envelope`** – [`ConnectionId`], [`Envelope`], [`Payload`].
//! - **`protocol::codec`** – [`PacketCodec`]: envelope ⇄ packet, in either
//!   multiplexed (JSON envelope with CID) or single (raw bytes) mode.

pub mod protocol;

pub use protocol::codec::{CodecMode, DecodeError, EncodeError, PacketCodec};
pub use protocol::envelope::{ConnectionId, Envelope, Payload};
pub use protocol::packet::{Multipart, PacketError, QueuePacket};
pub use protocol::wire::{decode_multipart, encode_multipart, WireError};
