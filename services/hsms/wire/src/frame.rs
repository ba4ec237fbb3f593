//! Stream framing for HSMS.
//!
//! Messages on the TCP stream are preceded by a big-endian u32 holding the
//! length of the header plus body.

use crate::header::{HEADER_SIZE, LENGTH_PREFIX_SIZE};
use crate::message::Message;
use bytes::{Buf, BytesMut};

/// Maximum accepted message length (16 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Frame decoder splitting complete messages off a receive buffer
#[derive(Debug)]
pub struct FrameDecoder {
    max_message_size: usize,
}

impl FrameDecoder {
    /// Create a new decoder with the default size limit
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Create a decoder with a custom size limit
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Decode one message from `buf`, or `None` if it is not complete yet
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, crate::WireError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        // Peek at the length
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if len < HEADER_SIZE {
            return Err(crate::WireError::Malformed);
        }
        if len > self.max_message_size {
            return Err(crate::WireError::TooLarge(len));
        }

        if buf.len() < LENGTH_PREFIX_SIZE + len {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let body = buf.split_to(len).freeze();
        Message::decode(body).map(Some)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
