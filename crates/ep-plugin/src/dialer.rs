//! Channel establishment
//!
//! A [`Dialer`] opens the byte stream a session runs over. Production
//! plugins use [`TlsDialer`]; anything implementing the trait (an in-memory
//! pipe, a plain TCP socket) works for the protocol.

use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use ep_core::traits::CredentialProvider;

use crate::error::SessionError;

/// Logical service name of the workflow server credentials
pub const WORKFLOW_SERVICE: &str = "workflow";

/// Bidirectional byte stream
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Owned, type-erased stream
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens channels to the workflow server
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a stream to `address`.
    ///
    /// Failures to reach the peer are `SessionError::Transport`.
    async fn dial(&self, address: &str) -> Result<BoxedStream, SessionError>;
}

/// Dials the workflow server over mutually authenticated TLS
pub struct TlsDialer {
    credentials: Arc<dyn CredentialProvider>,
    server_name: Option<String>,
}

impl TlsDialer {
    /// Create a dialer using client credentials of the workflow service
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            credentials,
            server_name: None,
        }
    }

    /// Verify the server certificate against this name instead of the
    /// host part of the dialed address
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// Host part of `host:port`, `[v6]:port` or a bare host
pub(crate) fn host_of(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
        _ => address,
    }
}

#[async_trait]
impl Dialer for TlsDialer {
    async fn dial(&self, address: &str) -> Result<BoxedStream, SessionError> {
        let config = self.credentials.client_config(WORKFLOW_SERVICE)?;

        let name = self
            .server_name
            .clone()
            .unwrap_or_else(|| host_of(address).to_string());
        let server_name = ServerName::try_from(name.clone())
            .map_err(|e| SessionError::Transport(format!("invalid server name {}: {}", name, e)))?;

        let tcp = TcpStream::connect(address)
            .await
            .map_err(|e| SessionError::Transport(format!("connect {}: {}", address, e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let tls = TlsConnector::from(config)
            .connect(server_name, tcp)
            .await
            .map_err(|e| SessionError::Transport(format!("TLS handshake with {}: {}", address, e)))?;

        tracing::debug!(address, server_name = %name, "TLS channel established");
        Ok(Box::new(tls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("10.0.0.1:50088"), "10.0.0.1");
        assert_eq!(host_of("workflow.local:443"), "workflow.local");
        assert_eq!(host_of("[fd00::1]:50088"), "fd00::1");
        assert_eq!(host_of("workflow.local"), "workflow.local");
        assert_eq!(host_of("fd00::1"), "fd00::1");
    }
}
