//! Websocket data frames as a plain value type.
//!
//! Control frames (ping, pong, close) never leave the connection layer, so
//! only text and binary frames are modelled here.

use wsbridge_core::Payload;

/// One websocket data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Picks the frame type for raw bytes: text when they are valid UTF-8,
    /// binary otherwise.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Frame::Text(text),
            Err(e) => Frame::Binary(e.into_bytes()),
        }
    }

    /// Converts an envelope payload into the frame sent to the peer.
    ///
    /// Structured payloads always go out as text; raw payloads follow
    /// [`Frame::from_bytes`].
    pub fn from_payload(payload: Payload) -> Self {
        match payload {
            Payload::Raw(bytes) => Self::from_bytes(bytes),
            json @ Payload::Json(_) => Frame::Text(json.into_text()),
        }
    }

    /// Interprets a frame received in multiplexed mode.
    pub fn into_payload(self) -> Payload {
        match self {
            Frame::Text(text) => Payload::from_text(text),
            Frame::Binary(bytes) => Payload::from_binary(bytes),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Frame::Text(text) => text.into_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
