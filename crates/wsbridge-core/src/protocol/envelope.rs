//! Envelope types: which websocket peer a payload came from or goes to.
//!
//! In multiplexed (server) mode every payload travelling over the queue
//! ports is wrapped with the [`ConnectionId`] of its peer.  In single
//! (client) mode there is exactly one peer, so the envelope has no CID and
//! the payload is passed through as raw bytes.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifies one websocket peer among the many multiplexed by a hub.
///
/// Identifiers are random UUID v4 values generated when a connection is
/// created.  They are only meaningful within one process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The data carried by an [`Envelope`].
///
/// Multiplexed mode carries structured JSON; single mode carries raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A JSON value (multiplexed mode).
    Json(Value),
    /// Opaque bytes (single mode).
    Raw(Vec<u8>),
}

impl Payload {
    /// Interprets a websocket text frame as a structured payload.
    ///
    /// Text that parses as JSON becomes that value; anything else becomes a
    /// JSON string so no peer data is lost.
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Json(Value::String(text)),
        }
    }

    /// Interprets a websocket binary frame as a structured payload.
    ///
    /// JSON bytes become that value, other UTF-8 becomes a string, and
    /// arbitrary binary is carried as a base64 string.
    pub fn from_binary(bytes: Vec<u8>) -> Self {
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            return Payload::Json(value);
        }
        match String::from_utf8(bytes) {
            Ok(text) => Payload::Json(Value::String(text)),
            Err(e) => Payload::Json(Value::String(BASE64.encode(e.as_bytes()))),
        }
    }

    /// Renders the payload as websocket text.
    ///
    /// A JSON string is sent verbatim (without quotes); any other JSON value
    /// is sent as compact JSON.
    pub fn into_text(self) -> String {
        match self {
            Payload::Json(Value::String(text)) => text,
            Payload::Json(value) => value.to_string(),
            Payload::Raw(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => BASE64.encode(e.as_bytes()),
            },
        }
    }

    /// Returns the payload as bytes for a single-mode queue packet.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Raw(bytes) => bytes,
            Payload::Json(Value::String(text)) => text.into_bytes(),
            Payload::Json(value) => value.to_string().into_bytes(),
        }
    }
}

/// A payload together with the CID of its websocket peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Present in multiplexed mode, absent in single mode.
    pub cid: Option<ConnectionId>,
    pub payload: Payload,
}

impl Envelope {
    /// An envelope addressed to (or received from) a specific peer.
    pub fn tagged(cid: ConnectionId, payload: Value) -> Self {
        Self {
            cid: Some(cid),
            payload: Payload::Json(payload),
        }
    }

    /// A single-mode envelope carrying raw bytes.
    pub fn untagged(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            cid: None,
            payload: Payload::Raw(bytes.into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
