//! Executor: runs operations against the cluster topology

use std::sync::Arc;

use ep_core::config::{ExecutorConfig, RegistrySettings};
use ep_core::traits::{RegistryClient, RepositoryClient};
use ep_core::{NodeInfo, NodeTopology};

use crate::error::ExecutorError;
use crate::fanout::run_across_nodes;
use crate::operation::Operation;
use crate::template::CommandTemplater;

const DEFAULT_BRIDGE_CAPACITY: usize = 64 * 1024;

/// Runs operations on nodes of one topology
pub struct Executor {
    pub(crate) topology: NodeTopology,
    pub(crate) templater: CommandTemplater,
    pub(crate) registry: Option<RegistrySettings>,
    pub(crate) registry_client: Option<Arc<dyn RegistryClient>>,
    pub(crate) repository_client: Option<Arc<dyn RepositoryClient>>,
    pub(crate) bridge_capacity: usize,
}

impl Executor {
    pub fn new(topology: NodeTopology) -> Self {
        Self {
            topology,
            templater: CommandTemplater::new(),
            registry: None,
            registry_client: None,
            repository_client: None,
            bridge_capacity: DEFAULT_BRIDGE_CAPACITY,
        }
    }

    /// Executor using the registry and bridge settings of `config`
    pub fn from_config(topology: NodeTopology, config: &ExecutorConfig) -> Self {
        let mut executor = Self::new(topology).with_bridge_capacity(config.bridge_capacity);
        if let Some(registry) = &config.registry {
            executor = executor.with_registry(registry.clone());
        }
        executor
    }

    pub fn with_registry(mut self, settings: RegistrySettings) -> Self {
        self.registry = Some(settings);
        self
    }

    pub fn with_registry_client(mut self, client: Arc<dyn RegistryClient>) -> Self {
        self.registry_client = Some(client);
        self
    }

    pub fn with_repository_client(mut self, client: Arc<dyn RepositoryClient>) -> Self {
        self.repository_client = Some(client);
        self
    }

    /// Buffer size between the two sides of a streamed copy
    pub fn with_bridge_capacity(mut self, capacity: usize) -> Self {
        self.bridge_capacity = capacity.max(1);
        self
    }

    pub fn topology(&self) -> &NodeTopology {
        &self.topology
    }

    /// Run `operation` on the nodes holding any of `roles`
    pub async fn execute(&self, roles: &[&str], operation: Operation) -> Result<(), ExecutorError> {
        let targets = self.topology.select(roles);
        self.execute_on(&targets, operation).await
    }

    /// Run `operation` on an explicit target set
    pub async fn execute_on(
        &self,
        targets: &[Arc<NodeInfo>],
        operation: Operation,
    ) -> Result<(), ExecutorError> {
        let kind = operation.kind();
        if operation.needs_targets() && targets.is_empty() {
            return Err(ExecutorError::Validation(format!(
                "{}: no target nodes",
                kind
            )));
        }

        tracing::info!(
            operation = %kind,
            targets = ?targets.iter().map(|n| n.ip()).collect::<Vec<_>>(),
            "Executing"
        );

        let result = match operation {
            Operation::Shell {
                command,
                interactive,
            } => run_across_nodes(&self.templater, targets, &command, interactive).await,
            Operation::CopyFromDay0(args) => self.copy_from_day0(targets, &args).await,
            Operation::CopyToDay0(args) => self.copy_to_day0(targets, &args).await,
            Operation::PushImage(images) => self.push_image(targets, &images).await,
            Operation::PushFile(args) => self.push_file(targets, &args).await,
            Operation::PullFile(args) => self.pull_file(targets, &args).await,
            Operation::CreateRegistryProjects(images) => {
                self.create_registry_projects(&images).await
            }
        };

        if let Err(e) = &result {
            tracing::error!(operation = %kind, error = %e, "Operation failed");
        }
        result
    }
}
