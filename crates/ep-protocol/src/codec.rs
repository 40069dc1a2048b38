//! Tokio codec for framed plugin messages

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, MAX_PAYLOAD_SIZE};
use crate::message::Message;

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Header decoded while waiting for the rest of the payload
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        let payload_len = header.payload_length as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();
        let message: Message = bincode::deserialize(&payload)?;

        if message.message_type() != header.message_type {
            return Err(ProtocolError::TypeMismatch {
                header: header.message_type,
                payload: message.message_type(),
            });
        }

        tracing::trace!(
            message_type = ?header.message_type,
            bytes = payload_len,
            "Decoded frame"
        );
        Ok(Some(message))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(&message)?;
        let payload_len = payload.len();

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        FrameHeader::new(message.message_type(), payload_len as u32).encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_SIZE;
    use crate::message::{ConnectStatus, WorkflowData};
    use bytes::Bytes;

    #[test]
    fn test_codec_connect_reply() {
        let mut codec = FrameCodec::new();
        let reply = Message::connect_reply(
            ConnectStatus::Connected,
            WorkflowData {
                data: Some(Bytes::from_static(b"{\"nodes\":3}")),
                plugin_data: None,
            },
        );

        let mut buf = BytesMut::new();
        codec.encode(reply.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, reply);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = FrameCodec::new();

        let mut full = BytesMut::new();
        codec
            .encode(
                Message::PluginConnect {
                    name: "kind-remover".to_string(),
                },
                &mut full,
            )
            .unwrap();

        let mut partial = full.split_to(HEADER_SIZE + 2);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full);
        match codec.decode(&mut partial).unwrap() {
            Some(Message::PluginConnect { name }) => assert_eq!(name, "kind-remover"),
            other => panic!("Expected PluginConnect, got {:?}", other),
        }
    }

    #[test]
    fn test_codec_two_frames_in_one_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Message::CompleteAck, &mut buf).unwrap();
        codec
            .encode(
                Message::PluginConnect {
                    name: "rke-parser".to_string(),
                },
                &mut buf,
            )
            .unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::CompleteAck));
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::PluginConnect { .. })
        ));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_rejects_oversized_header() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        FrameHeader::new(
            crate::message::MessageType::ConnectReply,
            (MAX_PAYLOAD_SIZE + 1) as u32,
        )
        .encode(&mut buf);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }
}
