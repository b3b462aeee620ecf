//! Newline-delimited JSON codec
//!
//! All messages are framed as:
//! ```text
//! [ N bytes: JSON object ][ '\n' ]
//! ```
//!
//! A trailing `\r` before the newline is tolerated and blank lines are skipped.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::Message;

/// Maximum line length (64 KiB) to prevent memory exhaustion
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode a message into a newline-terminated line
pub fn encode(message: &Message) -> Result<Bytes, CodecError> {
    let json = serde_json::to_vec(message)?;

    if json.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(json.len()));
    }

    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(b'\n');

    Ok(buf.freeze())
}

/// Try to decode one line from a buffer
///
/// Returns:
/// - `Ok(Some(message))` if a complete line was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the line is invalid; the offending line is consumed
pub fn decode(buf: &mut BytesMut) -> Result<Option<Message>, CodecError> {
    loop {
        let Some(newline) = buf.iter().position(|b| *b == b'\n') else {
            if buf.len() > MAX_MESSAGE_SIZE {
                let len = buf.len();
                buf.clear();
                return Err(CodecError::MessageTooLarge(len));
            }
            return Ok(None);
        };

        let line = buf.split_to(newline + 1);
        let mut body = &line[..newline];
        if let [rest @ .., b'\r'] = body {
            body = rest;
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        if body.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(body.len()));
        }

        return Ok(Some(serde_json::from_slice(body)?));
    }
}

/// Accumulates partial reads and yields complete messages
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next message from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete lines.
    /// After an error the decoder is positioned at the next line.
    pub fn decode_next(&mut self) -> Result<Option<Message>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
