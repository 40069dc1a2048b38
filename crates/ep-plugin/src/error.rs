//! Plugin session errors

use std::time::Duration;

use ep_core::{CredentialError, SchemaError};
use ep_protocol::ProtocolError;
use thiserror::Error;

/// Errors from connecting to or completing a workflow.
///
/// The variants are distinct so a workflow engine can pick a recovery
/// strategy (retry the connection, abort the workflow) without matching on
/// error text.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Channel could not be established or dropped mid-handshake
    #[error("Transport error: {0}")]
    Transport(String),

    /// No client credentials for the workflow service
    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),

    /// Server answered outside the protocol contract
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Shared workflow data failed to deserialize
    #[error("Shared workflow data is corrupt: {0}")]
    SharedDataCorrupt(#[source] SchemaError),

    /// Private plugin data failed to deserialize
    #[error("Private plugin data is corrupt: {0}")]
    PrivateDataCorrupt(#[source] SchemaError),

    /// Private plugin data failed to serialize on completion
    #[error("Failed to encode private plugin data: {0}")]
    PrivateDataEncode(#[source] SchemaError),

    /// Server did not answer the handshake in time
    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    /// Completion could not be reported
    #[error("Plugin complete failed: {0}")]
    Complete(String),
}

impl SessionError {
    /// Whether trying the same call again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Transport(_) | SessionError::Timeout(_))
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => SessionError::Transport(e.to_string()),
            other => SessionError::Protocol(other.to_string()),
        }
    }
}
