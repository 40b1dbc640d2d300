//! Multipart framing for queue ports carried over a TCP stream.
//!
//! Wire format:
//! ```text
//! [frame_count:4][len_0:4][frame_0:len_0][len_1:4][frame_1:len_1]...
//! ```
//! All integers are big-endian `u32`.  A frame may be empty (`len = 0`).
//!
//! TCP is a stream protocol, so a reader accumulates bytes and calls
//! [`decode_multipart`] until it stops returning
//! [`WireError::InsufficientData`].

use thiserror::Error;

use crate::protocol::packet::Multipart;

/// Upper bound on the number of frames in one multipart message.
pub const MAX_FRAMES: usize = 16;

/// Upper bound on the size of one frame (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

/// Errors that can occur while framing or unframing multipart messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The buffer does not yet hold a complete message.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The frame count exceeds [`MAX_FRAMES`].
    #[error("too many frames: {0} (max {MAX_FRAMES})")]
    TooManyFrames(usize),

    /// A frame length exceeds [`MAX_FRAME_LEN`].
    #[error("frame too large: {len} bytes (max {MAX_FRAME_LEN})")]
    FrameTooLarge { len: usize },
}

/// Serialises a multipart message into one contiguous buffer.
///
/// # Errors
///
/// Returns [`WireError::TooManyFrames`] or [`WireError::FrameTooLarge`] when
/// the message exceeds the framing limits.
///
/// # Examples
///
/// ```rust
/// use wsbridge_core::{decode_multipart, encode_multipart};
///
/// let frames = vec![Vec::new(), b"hello".to_vec()];
/// let bytes = encode_multipart(&frames).unwrap();
/// let (decoded, consumed) = decode_multipart(&bytes).unwrap();
/// assert_eq!(decoded, frames);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_multipart(frames: &[Vec<u8>]) -> Result<Vec<u8>, WireError> {
    if frames.len() > MAX_FRAMES {
        return Err(WireError::TooManyFrames(frames.len()));
    }

    let body: usize = frames.iter().map(|f| PREFIX_LEN + f.len()).sum();
    let mut buf = Vec::with_capacity(PREFIX_LEN + body);
    buf.extend_from_slice(&(frames.len() as u32).to_be_bytes());

    for frame in frames {
        if frame.len() > MAX_FRAME_LEN {
            return Err(WireError::FrameTooLarge { len: frame.len() });
        }
        buf.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        buf.extend_from_slice(frame);
    }

    Ok(buf)
}

/// Decodes one multipart message from the beginning of `bytes`.
///
/// Returns the frames and the number of bytes consumed so the caller can
/// advance its read buffer.
///
/// # Errors
///
/// Returns [`WireError::InsufficientData`] when more bytes are needed, and
/// the limit errors when the header announces an oversized message.  The
/// limit errors are not recoverable for the stream they came from.
pub fn decode_multipart(bytes: &[u8]) -> Result<(Multipart, usize), WireError> {
    let count = read_u32(bytes, 0)? as usize;
    if count > MAX_FRAMES {
        return Err(WireError::TooManyFrames(count));
    }

    let mut offset = PREFIX_LEN;
    let mut frames = Vec::with_capacity(count);

    for _ in 0..count {
        let len = read_u32(bytes, offset)? as usize;
        if len > MAX_FRAME_LEN {
            return Err(WireError::FrameTooLarge { len });
        }
        offset += PREFIX_LEN;

        let end = offset + len;
        if bytes.len() < end {
            return Err(WireError::InsufficientData {
                needed: end,
                available: bytes.len(),
            });
        }
        frames.push(bytes[offset..end].to_vec());
        offset = end;
    }

    Ok((frames, offset))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, WireError> {
    let end = offset + PREFIX_LEN;
    if bytes.len() < end {
        return Err(WireError::InsufficientData {
            needed: end,
            available: bytes.len(),
        });
    }
    let mut raw = [0u8; PREFIX_LEN];
    raw.copy_from_slice(&bytes[offset..end]);
    Ok(u32::from_be_bytes(raw))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
