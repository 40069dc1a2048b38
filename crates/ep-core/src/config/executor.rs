//! Executor configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use super::duration_secs;
use crate::error::ConfigError;
use crate::traits::RegistryEndpoint;
use crate::types::DAY0_ROLE;

/// Project namespace files are stored under in the repository
pub const DEFAULT_REPO_PROJECT: &str = "intel_ek";

/// Configuration for the multi-node executor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Cluster nodes
    pub nodes: Vec<NodeConfig>,

    /// Defaults for reaching nodes over SSH
    pub ssh: SshSettings,

    /// Registry served from the bootstrap node
    pub registry: Option<RegistrySettings>,

    /// Capacity of the in-memory bridge between a producer and a consumer
    pub bridge_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            ssh: SshSettings::default(),
            registry: None,
            bridge_capacity: 64 * 1024,
        }
    }
}

impl ExecutorConfig {
    /// Check the node list describes a usable topology
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge_capacity == 0 {
            return Err(ConfigError::Invalid(
                "bridge_capacity must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.ip.trim().is_empty() {
                return Err(ConfigError::MissingField("nodes.ip".to_string()));
            }
            if node.roles.is_empty() {
                return Err(ConfigError::Invalid(format!("node {} has no role", node.ip)));
            }
            if !seen.insert(node.ip.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate node {}", node.ip)));
            }
        }

        if !self.nodes.iter().any(|n| n.roles.iter().any(|r| r == DAY0_ROLE)) {
            return Err(ConfigError::Invalid(format!(
                "no node holds the \"{}\" role",
                DAY0_ROLE
            )));
        }

        Ok(())
    }
}

/// One node entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node address
    pub ip: String,

    /// Roles held by the node
    pub roles: Vec<String>,

    /// SSH user (falls back to `ssh.user`)
    #[serde(default)]
    pub user: Option<String>,

    /// SSH port (falls back to `ssh.port`)
    #[serde(default)]
    pub port: Option<u16>,

    /// Private key (falls back to `ssh.private_key_path`)
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Expected host key fingerprint. Any key is accepted when unset.
    #[serde(default)]
    pub host_key: Option<String>,
}

/// SSH defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub user: String,
    pub port: u16,
    pub private_key_path: PathBuf,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            private_key_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ssh")
                .join("id_rsa"),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Provider (bootstrap) host address
    pub provider_ip: String,
    /// Registry port on the provider host
    pub registry_port: u16,
    pub user: String,
    pub password: String,
    /// Repository project files are pushed under
    #[serde(default = "default_project")]
    pub project: String,
}

fn default_project() -> String {
    DEFAULT_REPO_PROJECT.to_string()
}

impl RegistrySettings {
    /// Endpoint handed to the registry collaborator
    pub fn endpoint(&self) -> RegistryEndpoint {
        RegistryEndpoint {
            provider_ip: self.provider_ip.clone(),
            registry_port: self.registry_port,
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}
