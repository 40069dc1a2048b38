//! Executor errors

use std::fmt;

use ep_core::{CollaboratorError, TransportError};
use thiserror::Error;

/// One node's share of a failed fan-out
#[derive(Debug)]
pub struct NodeFailure {
    /// Address of the node that failed
    pub node: String,
    pub error: TransportError,
}

impl NodeFailure {
    pub fn new(node: impl Into<String>, error: TransportError) -> Self {
        Self {
            node: node.into(),
            error,
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.error)
    }
}

fn list(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(NodeFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from executor operations
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Malformed arguments or target set, caught before any remote call
    #[error("Invalid operation: {0}")]
    Validation(String),

    /// A command placeholder could not be filled for a node
    #[error("Failed to template command for {node}: {source}")]
    Template {
        node: String,
        #[source]
        source: handlebars::RenderError,
    },

    /// Operation restricted to the bootstrap node was aimed elsewhere
    #[error("{operation}: only supported on day-0 (got {node})")]
    DayZeroOnly {
        operation: &'static str,
        node: String,
    },

    /// At least one node failed during a fan-out
    #[error("{} node(s) failed: {}", .0.len(), list(.0))]
    RemoteExecution(Vec<NodeFailure>),

    /// The coordinator could not use a node transport
    #[error("Transport error on {node}: {source}")]
    Transport {
        node: String,
        #[source]
        source: TransportError,
    },

    #[error("Registry error: {0}")]
    Registry(#[source] CollaboratorError),

    #[error("Repository error: {0}")]
    Repository(#[source] CollaboratorError),
}

impl ExecutorError {
    /// Nodes that failed, if this is a fan-out failure
    pub fn failed_nodes(&self) -> Vec<&str> {
        match self {
            ExecutorError::RemoteExecution(failures) => {
                failures.iter().map(|f| f.node.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}
