//! ep-plugin: Plugin side of the workflow protocol
//!
//! A plugin is an out-of-process unit of work. It joins a workflow through a
//! [`PluginSession`], receives the workflow data snapshot, does its work and
//! reports completion exactly once. The [`server`] module hosts the other
//! end of the protocol; [`runner`] ties registered plugin bodies to sessions.

pub mod dialer;
pub mod error;
pub mod registry;
pub mod runner;
pub mod server;
pub mod session;

pub use dialer::{AsyncStream, BoxedStream, Dialer, TlsDialer, WORKFLOW_SERVICE};
pub use error::SessionError;
pub use registry::{schema_key, PluginDescriptor, PluginMain, PluginRegistry};
pub use runner::{PluginRunner, RunOutcome, RunnerError};
pub use server::{serve_plugin_connection, ConnectOutcome, Rejection, WorkflowHandler, WorkflowListener};
pub use session::{ConnectedSession, PluginSession};
