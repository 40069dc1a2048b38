//! Frame header encoding/decoding
//!
//! Every message travels in a frame with a 6-byte header:
//! - version: 1 byte (u8)
//! - message_type: 1 byte (u8)
//! - payload_length: 4 bytes (u32, big-endian)

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::message::MessageType;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 6;

/// Maximum payload size (64MB). Workflow data snapshots can be large.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Version byte carried by every frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version of the sender
    pub version: u8,
    /// Type of message in the payload
    pub message_type: MessageType,
    /// Length of the payload in bytes
    pub payload_length: u32,
}

impl FrameHeader {
    /// Create a header for the current protocol version
    pub fn new(message_type: MessageType, payload_length: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_type,
            payload_length,
        }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.version);
        dst.put_u8(self.message_type.as_u8());
        dst.put_u32(self.payload_length);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer. Nothing is
    /// consumed when the version or message type is rejected.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let version = src[0];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let message_type =
            MessageType::from_u8(src[1]).ok_or(ProtocolError::UnknownMessageType(src[1]))?;

        src.advance(2);
        let payload_length = src.get_u32();

        Ok(Some(Self {
            version,
            message_type,
            payload_length,
        }))
    }
}
