//! Plugin session configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::duration_secs;

/// Configuration for a plugin connecting to the workflow server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Workflow server address (`host:port`)
    pub workflow_address: String,

    /// Name expected in the server certificate. Defaults to the host part
    /// of `workflow_address`.
    pub server_name: Option<String>,

    /// Directory holding `<service>/ca.pem`, `<service>/client.pem`, ...
    pub cert_dir: PathBuf,

    /// Bound on establishing the channel (TCP + TLS)
    #[serde(with = "duration_secs")]
    pub dial_timeout: Duration,

    /// Bound on the connect handshake. The server holds its reply until the
    /// plugin's inputs are ready, so this is long.
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            workflow_address: "127.0.0.1:50088".to_string(),
            server_name: None,
            cert_dir: super::default_config_dir().join("cert"),
            dial_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(3600),
        }
    }
}
