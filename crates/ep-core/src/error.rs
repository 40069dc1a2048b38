//! Core error types for ep

use std::path::PathBuf;
use thiserror::Error;

/// Node transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not reach or authenticate to the node
    #[error("Failed to connect to {node}: {reason}")]
    Connect { node: String, reason: String },

    /// Command issued before `connect`
    #[error("Not connected to {0}")]
    NotConnected(String),

    /// The command could not be started or its channel dropped
    #[error("Command failed on {node}: {reason}")]
    Exec { node: String, reason: String },

    /// The command ran and returned non-zero
    #[error("Command on {node} exited with status {status}")]
    ExitStatus { node: String, status: u32 },

    /// I/O error while streaming
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Topology construction errors
#[derive(Error, Debug)]
pub enum TopologyError {
    /// No node holds the bootstrap role
    #[error("Topology has no \"day-0\" node")]
    MissingDayZero,

    /// Two nodes share one address
    #[error("Duplicate node address: {0}")]
    DuplicateAddress(String),

    /// A node was declared without any role
    #[error("Node {0} has no role")]
    NoRole(String),
}

/// Schema data errors
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Value could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Key not present in a schema map
    #[error("Missing schema key: {0}")]
    MissingKey(String),

    /// No constructor registered under that name
    #[error("Schema not registered: {0}")]
    Unregistered(String),
}

/// TLS credential errors
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Certificate or key file missing
    #[error("Credential file not found: {0}")]
    NotFound(PathBuf),

    /// File read failed
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PEM file held no usable key
    #[error("No private key in {0}")]
    NoKey(PathBuf),

    /// rustls rejected the material
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Provider returned a config for the other role
    #[error("Expected a {expected} TLS config for service {service}")]
    WrongRole { service: String, expected: String },
}

/// Failure reported by an external collaborator (registry, repository)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
