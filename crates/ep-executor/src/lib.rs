//! ep-executor: Multi-node command executor
//!
//! Fans one logical operation out to a set of cluster nodes:
//! - shell commands, templated per node and run concurrently
//! - streamed copies between the bootstrap (day-0) node and other nodes
//! - registry and file repository operations served from the bootstrap node
//!
//! Every operation validates its arguments and target set before touching
//! any node.

pub mod bridge;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod operation;
pub mod registry;
pub mod ssh;
pub mod template;

pub use error::{ExecutorError, NodeFailure};
pub use executor::Executor;
pub use fanout::run_across_nodes;
pub use operation::{Operation, OperationKind};
pub use registry::{pull_url, DEFAULT_REVISION};
pub use ssh::SshTransport;
pub use template::CommandTemplater;
