//! Core trait definitions

mod credentials;
mod registry;
mod transport;

pub use credentials::{CredentialProvider, TlsConfig, TlsRole};
pub use registry::{AuthConfig, RegistryClient, RegistryEndpoint, RepositoryClient};
pub use transport::{AttachedIo, BoxedReader, BoxedWriter, NodeTransport};
