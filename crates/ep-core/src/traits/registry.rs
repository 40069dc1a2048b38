//! Registry and repository collaborator traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Where the cluster's image registry lives and how to log into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEndpoint {
    /// Address of the provider (bootstrap) host serving the registry
    pub provider_ip: String,
    /// Registry port on the provider host
    pub registry_port: u16,
    /// Registry user
    pub user: String,
    /// Registry password
    pub password: String,
}

impl RegistryEndpoint {
    /// `ip:port` of the registry
    pub fn address(&self) -> String {
        format!("{}:{}", self.provider_ip, self.registry_port)
    }
}

/// Resolved registry credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Registry address images are pushed to
    pub server_address: String,
    pub username: String,
    pub password: String,
}

/// Container registry operations.
///
/// Implementations are stateless per call: auth is resolved again for
/// every operation.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve credentials for the registry
    async fn resolve_auth(&self, endpoint: &RegistryEndpoint)
        -> Result<AuthConfig, CollaboratorError>;

    /// Retag `image` under `registry_address`, returning the new reference
    async fn retag_to_local(
        &self,
        image: &str,
        registry_address: &str,
    ) -> Result<String, CollaboratorError>;

    /// Push an image reference
    async fn push_image(&self, image: &str, auth: &AuthConfig) -> Result<(), CollaboratorError>;

    /// Map image references onto per-project registry paths, creating the
    /// registry projects that do not exist yet
    async fn map_and_create_projects(
        &self,
        endpoint: &RegistryEndpoint,
        images: &[String],
    ) -> Result<Vec<String>, CollaboratorError>;
}

/// Content-addressable file repository operations
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Push a local file under `content_ref:revision`, returning its digest
    async fn push_file(
        &self,
        path: &str,
        content_ref: &str,
        revision: &str,
    ) -> Result<String, CollaboratorError>;

    /// Pull `source_url` into `dest`
    async fn pull_file(&self, dest: &str, source_url: &str) -> Result<(), CollaboratorError>;
}
