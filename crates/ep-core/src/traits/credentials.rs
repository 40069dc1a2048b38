//! TLS credential provider trait

use std::fmt;
use std::sync::Arc;

use crate::error::CredentialError;

/// Side of a mutually authenticated connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    Client,
    Server,
}

impl fmt::Display for TlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsRole::Client => write!(f, "client"),
            TlsRole::Server => write!(f, "server"),
        }
    }
}

/// TLS configuration for one role
#[derive(Clone)]
pub enum TlsConfig {
    Client(Arc<rustls::ClientConfig>),
    Server(Arc<rustls::ServerConfig>),
}

/// Issues mutually authenticated TLS configurations keyed by logical
/// service name ("workflow", "registry", ...) and role.
pub trait CredentialProvider: Send + Sync {
    /// TLS config for `service` acting as `role`.
    ///
    /// `extra` selects an alternative certificate for the same service and
    /// role; providers may ignore it.
    fn tls_config(
        &self,
        service: &str,
        role: TlsRole,
        extra: Option<&str>,
    ) -> Result<TlsConfig, CredentialError>;

    /// Client config for `service`
    fn client_config(&self, service: &str) -> Result<Arc<rustls::ClientConfig>, CredentialError> {
        match self.tls_config(service, TlsRole::Client, None)? {
            TlsConfig::Client(config) => Ok(config),
            TlsConfig::Server(_) => Err(CredentialError::WrongRole {
                service: service.to_string(),
                expected: TlsRole::Client.to_string(),
            }),
        }
    }

    /// Server config for `service`
    fn server_config(&self, service: &str) -> Result<Arc<rustls::ServerConfig>, CredentialError> {
        match self.tls_config(service, TlsRole::Server, None)? {
            TlsConfig::Server(config) => Ok(config),
            TlsConfig::Client(_) => Err(CredentialError::WrongRole {
                service: service.to_string(),
                expected: TlsRole::Server.to_string(),
            }),
        }
    }
}
