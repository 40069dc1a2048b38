//! Message types for the plugin protocol
//!
//! # Message Flow
//!
//! 1. Plugin dials the workflow server and sends `PluginConnect`
//! 2. Server answers with `ConnectReply`. The reply may take a long time:
//!    the server holds it until the plugin's inputs are ready.
//!    - status `Completed`: the workflow is already done, no data follows
//!    - status `Connected`: `workflow_data` carries the shared snapshot and,
//!      optionally, the plugin's private data
//! 3. Plugin does its work, then sends `PluginComplete` with its outcome and
//!    (on success) its private data
//! 4. Server answers with `CompleteAck` and the connection is closed
//!
//! Either side may answer with `Error` instead.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Message type identifier carried in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Plugin asks to join the workflow
    PluginConnect = 0x01,
    /// Server answer to `PluginConnect`
    ConnectReply = 0x02,
    /// Plugin reports its outcome
    PluginComplete = 0x03,
    /// Server acknowledges the outcome
    CompleteAck = 0x04,
    /// Error response
    Error = 0xFF,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::PluginConnect),
            0x02 => Some(Self::ConnectReply),
            0x03 => Some(Self::PluginComplete),
            0x04 => Some(Self::CompleteAck),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// Outcome of a connect handshake.
///
/// Travels as a raw code so that a client can tell a status it does not
/// know apart from a malformed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectStatus {
    /// Workflow already finished, nothing to do
    Completed = 1,
    /// Plugin joined, workflow data attached
    Connected = 2,
}

impl ConnectStatus {
    /// Wire code for this status
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse a wire code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Completed),
            2 => Some(Self::Connected),
            _ => None,
        }
    }
}

/// Logical outcome reported by a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompleteStatus {
    Success,
    Error,
}

/// Error codes for error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Unknown error
    Unknown = 0,
    /// No plugin with that name in the workflow
    UnknownPlugin = 1,
    /// Frame could not be decoded
    InvalidMessage = 2,
    /// Protocol version not supported
    UnsupportedVersion = 3,
}

/// Binary workflow payloads.
///
/// The encoding of each blob belongs to the data structure it came from;
/// the protocol only moves bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowData {
    /// Workflow-wide data shared by every plugin
    pub data: Option<Bytes>,
    /// Data private to the addressed plugin
    pub plugin_data: Option<Bytes>,
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Join the workflow as the named plugin
    PluginConnect {
        /// Plugin name
        name: String,
    },

    /// Answer to `PluginConnect`
    ConnectReply {
        /// Raw `ConnectStatus` code
        status: u8,
        /// Snapshot of the workflow data (empty unless connected)
        workflow_data: WorkflowData,
    },

    /// Report the plugin outcome
    PluginComplete {
        /// Plugin name
        name: String,
        /// Logical outcome
        status: CompleteStatus,
        /// Only `plugin_data` is honoured by the server
        workflow_data: WorkflowData,
    },

    /// Answer to `PluginComplete`
    CompleteAck,

    /// Error response
    Error {
        /// Error code
        code: ErrorCode,
        /// Human-readable message
        message: String,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::PluginConnect { .. } => MessageType::PluginConnect,
            Message::ConnectReply { .. } => MessageType::ConnectReply,
            Message::PluginComplete { .. } => MessageType::PluginComplete,
            Message::CompleteAck => MessageType::CompleteAck,
            Message::Error { .. } => MessageType::Error,
        }
    }

    /// Build a connect reply for the given status
    pub fn connect_reply(status: ConnectStatus, workflow_data: WorkflowData) -> Self {
        Message::ConnectReply {
            status: status.code(),
            workflow_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for msg_type in [
            MessageType::PluginConnect,
            MessageType::ConnectReply,
            MessageType::PluginComplete,
            MessageType::CompleteAck,
            MessageType::Error,
        ] {
            assert_eq!(MessageType::from_u8(msg_type.as_u8()), Some(msg_type));
        }
    }

    #[test]
    fn test_connect_status_unknown_code() {
        assert_eq!(ConnectStatus::from_code(1), Some(ConnectStatus::Completed));
        assert_eq!(ConnectStatus::from_code(2), Some(ConnectStatus::Connected));
        assert_eq!(ConnectStatus::from_code(0), None);
        assert_eq!(ConnectStatus::from_code(42), None);
    }
}
