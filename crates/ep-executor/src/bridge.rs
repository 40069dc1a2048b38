//! Streaming copies between the bootstrap node and target nodes
//!
//! Each target is paired with the bootstrap node. One side archives the
//! source with `tar -c` into an in-memory bridge, the other unpacks it with
//! `tar -x`. Nothing is staged on local disk.

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinSet;

use ep_core::traits::AttachedIo;
use ep_core::NodeInfo;

use crate::error::{ExecutorError, NodeFailure};
use crate::executor::Executor;
use crate::fanout::join_failures;

/// Which side of a pair produces the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    FromDay0,
    ToDay0,
}

impl Direction {
    fn operation(self) -> &'static str {
        match self {
            Direction::FromDay0 => "copy-from-day0",
            Direction::ToDay0 => "copy-to-day0",
        }
    }
}

/// Validated copy arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CopySpec {
    source_dir: String,
    source_name: String,
    destination: String,
}

impl CopySpec {
    fn parse(operation: &str, args: &[String]) -> Result<Self, ExecutorError> {
        let [source, destination, ..] = args else {
            return Err(ExecutorError::Validation(format!(
                "{}: expected <source> <destination/>, got {} argument(s)",
                operation,
                args.len()
            )));
        };
        if !destination.ends_with('/') {
            return Err(ExecutorError::Validation(format!(
                "{}: \"{}\" should end with \"/\"",
                operation, destination
            )));
        }

        let path = Path::new(source);
        let source_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ExecutorError::Validation(format!("{}: \"{}\" names no file", operation, source))
            })?
            .to_string();
        let source_dir = match path.parent().and_then(Path::to_str) {
            Some("") | None => ".".to_string(),
            Some(dir) => dir.to_string(),
        };

        Ok(Self {
            source_dir,
            source_name,
            destination: destination.clone(),
        })
    }

    fn pack(&self) -> Vec<String> {
        vec![
            "tar".to_string(),
            "-c".to_string(),
            "-C".to_string(),
            self.source_dir.clone(),
            self.source_name.clone(),
        ]
    }

    fn unpack(&self) -> Vec<String> {
        vec![
            "tar".to_string(),
            "-x".to_string(),
            "-C".to_string(),
            self.destination.clone(),
        ]
    }
}

/// One producer/consumer pair
struct Pair {
    target: Arc<NodeInfo>,
    bootstrap: Arc<NodeInfo>,
    target_cmd: Vec<String>,
    bootstrap_cmd: Vec<String>,
    direction: Direction,
    capacity: usize,
}

impl Pair {
    fn sides(&self) -> ((&NodeInfo, &[String]), (&NodeInfo, &[String])) {
        let target = (self.target.as_ref(), self.target_cmd.as_slice());
        let bootstrap = (self.bootstrap.as_ref(), self.bootstrap_cmd.as_slice());
        match self.direction {
            Direction::FromDay0 => (bootstrap, target),
            Direction::ToDay0 => (target, bootstrap),
        }
    }

    /// Run both sides; the bootstrap connection is owned by the caller
    async fn run(self) -> Vec<NodeFailure> {
        let manage_target = self.target.ip() != self.bootstrap.ip();
        if manage_target {
            if let Err(e) = self.target.client().connect().await {
                return vec![NodeFailure::new(self.target.ip(), e)];
            }
        }

        let mut failures = Vec::new();
        let ((producer, produce_cmd), (consumer, consume_cmd)) = self.sides();
        let (write_half, read_half) = tokio::io::duplex(self.capacity);

        // The producer's stdout is the write half; the transport drops it
        // when the command returns, which ends the consumer's input.
        let produce = producer.client().run_with_attached_io(
            produce_cmd,
            AttachedIo::new(Box::new(write_half), Box::new(tokio::io::stderr())),
        );
        let consume = consumer.client().run_with_attached_io(
            consume_cmd,
            AttachedIo::process(false).with_stdin(Box::new(read_half)),
        );
        let (produced, consumed) = tokio::join!(produce, consume);

        if let Err(e) = produced {
            failures.push(NodeFailure::new(producer.ip(), e));
        }
        if let Err(e) = consumed {
            failures.push(NodeFailure::new(consumer.ip(), e));
        }

        if manage_target {
            if let Err(e) = self.target.client().disconnect().await {
                failures.push(NodeFailure::new(self.target.ip(), e));
            }
        }
        failures
    }
}

impl Executor {
    /// Copy `args[0]` from the bootstrap node into directory `args[1]` on
    /// every target
    pub async fn copy_from_day0(
        &self,
        targets: &[Arc<NodeInfo>],
        args: &[String],
    ) -> Result<(), ExecutorError> {
        self.bridge(Direction::FromDay0, targets, args).await
    }

    /// Copy `args[0]` from every target into directory `args[1]` on the
    /// bootstrap node
    pub async fn copy_to_day0(
        &self,
        targets: &[Arc<NodeInfo>],
        args: &[String],
    ) -> Result<(), ExecutorError> {
        self.bridge(Direction::ToDay0, targets, args).await
    }

    async fn bridge(
        &self,
        direction: Direction,
        targets: &[Arc<NodeInfo>],
        args: &[String],
    ) -> Result<(), ExecutorError> {
        let operation = direction.operation();
        let spec = CopySpec::parse(operation, args)?;
        let bootstrap = Arc::clone(self.topology.day0());

        let (target_template, bootstrap_template) = match direction {
            Direction::FromDay0 => (spec.unpack(), spec.pack()),
            Direction::ToDay0 => (spec.pack(), spec.unpack()),
        };

        // Both sides of a pair are templated with the target's values
        let mut pairs = Vec::with_capacity(targets.len());
        for target in targets {
            pairs.push(Pair {
                target: Arc::clone(target),
                bootstrap: Arc::clone(&bootstrap),
                target_cmd: self.templater.cmd_override_with_node(&target_template, target)?,
                bootstrap_cmd: self.templater.cmd_override_with_node(&bootstrap_template, target)?,
                direction,
                capacity: self.bridge_capacity,
            });
        }

        tracing::info!(
            operation,
            source = %args[0],
            destination = %spec.destination,
            targets = pairs.len(),
            "Starting streamed copy"
        );

        bootstrap
            .client()
            .connect()
            .await
            .map_err(|source| ExecutorError::Transport {
                node: bootstrap.ip().to_string(),
                source,
            })?;

        let mut tasks = JoinSet::new();
        for pair in pairs {
            tasks.spawn(pair.run());
        }
        let joined = join_failures(tasks).await;

        let released = bootstrap.client().disconnect().await;
        match (joined, released) {
            (Err(e), Err(release)) => {
                tracing::warn!(node = %bootstrap.ip(), error = %release, "Failed to disconnect bootstrap node");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(source)) => Err(ExecutorError::Transport {
                node: bootstrap.ip().to_string(),
                source,
            }),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}
