//! ep-protocol: Wire protocol for workflow plugins
//!
//! This crate defines the binary protocol a plugin process uses to join a
//! workflow on the workflow server, pull the current workflow data and
//! report its completion.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
pub use message::{
    CompleteStatus, ConnectStatus, ErrorCode, Message, MessageType, WorkflowData,
};
