//! Concurrent fan-out of one command to many nodes

use std::sync::Arc;

use tokio::task::JoinSet;

use ep_core::traits::AttachedIo;
use ep_core::{NodeInfo, TransportError};

use crate::error::{ExecutorError, NodeFailure};
use crate::template::CommandTemplater;

/// Run `command` on every node in parallel, attached to this process's
/// standard streams.
///
/// Every node's command is templated before any task starts, so a template
/// error touches no node. Returns once every node has finished; all
/// failures are reported together.
///
/// An interactive run attaches the terminal and is limited to one node.
pub async fn run_across_nodes(
    templater: &CommandTemplater,
    nodes: &[Arc<NodeInfo>],
    command: &[String],
    interactive: bool,
) -> Result<(), ExecutorError> {
    if interactive && nodes.len() > 1 {
        return Err(ExecutorError::Validation(format!(
            "interactive command needs a single target node, got {}",
            nodes.len()
        )));
    }

    let mut planned = Vec::with_capacity(nodes.len());
    for node in nodes {
        planned.push((Arc::clone(node), templater.cmd_override_with_node(command, node)?));
    }

    tracing::info!(nodes = planned.len(), interactive, "Running command across nodes");

    let mut tasks = JoinSet::new();
    for (node, command) in planned {
        tasks.spawn(async move {
            match run_on_node(&node, &command, AttachedIo::process(interactive)).await {
                Ok(()) => Vec::new(),
                Err(error) => vec![NodeFailure::new(node.ip(), error)],
            }
        });
    }

    join_failures(tasks).await
}

/// Connect, run, disconnect. The transport is released even when the
/// command fails.
pub(crate) async fn run_on_node(
    node: &NodeInfo,
    command: &[String],
    io: AttachedIo,
) -> Result<(), TransportError> {
    let client = node.client();
    client.connect().await?;

    let result = client.run_with_attached_io(command, io).await;
    let released = client.disconnect().await;

    match (result, released) {
        (Err(e), Err(release)) => {
            tracing::warn!(node = %node.ip(), error = %release, "Disconnect failed after command error");
            Err(e)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Join barrier: wait for every task and gather what failed
pub(crate) async fn join_failures(
    mut tasks: JoinSet<Vec<NodeFailure>>,
) -> Result<(), ExecutorError> {
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(node_failures) => failures.extend(node_failures),
            Err(e) => failures.push(NodeFailure::new(
                "unknown",
                TransportError::Exec {
                    node: "unknown".to_string(),
                    reason: format!("task aborted: {}", e),
                },
            )),
        }
    }

    if failures.is_empty() {
        return Ok(());
    }
    for failure in &failures {
        tracing::error!(node = %failure.node, error = %failure.error, "Node failed");
    }
    Err(ExecutorError::RemoteExecution(failures))
}
