//! ep-core: Core abstractions and configuration for ep
//!
//! This crate provides the shared node and topology types, the schema data
//! contract used to exchange workflow state, the traits behind which external
//! collaborators live (node transports, TLS credentials, registry and
//! repository clients) and the configuration structures used by the plugin
//! and executor crates.

pub mod config;
pub mod error;
pub mod schema;
pub mod tls;
pub mod traits;
pub mod types;

pub use error::{
    CollaboratorError, ConfigError, CredentialError, SchemaError, TopologyError, TransportError,
};
pub use schema::{SchemaData, SchemaMap, SchemaRegistry};
pub use types::{NodeInfo, NodeTopology, DAY0_ROLE};
