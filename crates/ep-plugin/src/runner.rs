//! Runs registered plugins against the workflow server
//!
//! One run is: connect, skip if the workflow is finished, run the plugin
//! body on the shared snapshot, then report the outcome.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use ep_core::config::PluginConfig;
use ep_core::tls::PemCredentialProvider;
use ep_core::{SchemaError, SchemaMap};

use crate::dialer::{Dialer, TlsDialer};
use crate::error::SessionError;
use crate::registry::PluginRegistry;
use crate::session::PluginSession;

/// Errors from running a plugin
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The plugin body failed. The failure has been reported to the server.
    #[error("Plugin {name} failed: {source:#}")]
    Plugin {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The workflow was already done; the plugin body did not run
    AlreadyCompleted,
    /// The plugin body ran and its output was reported
    Completed,
}

/// Runs plugins from a registry
pub struct PluginRunner {
    registry: Arc<PluginRegistry>,
    dialer: Arc<dyn Dialer>,
    config: PluginConfig,
}

impl PluginRunner {
    pub fn new(registry: Arc<PluginRegistry>, dialer: Arc<dyn Dialer>, config: PluginConfig) -> Self {
        Self {
            registry,
            dialer,
            config,
        }
    }

    /// Runner dialing over TLS with PEM credentials from `config.cert_dir`
    pub fn from_config(registry: Arc<PluginRegistry>, config: PluginConfig) -> Self {
        let credentials = Arc::new(PemCredentialProvider::new(&config.cert_dir));
        let mut dialer = TlsDialer::new(credentials);
        if let Some(name) = &config.server_name {
            dialer = dialer.with_server_name(name.clone());
        }
        Self::new(registry, Arc::new(dialer), config)
    }

    /// Run plugin `name` once
    pub async fn run(&self, name: &str) -> Result<RunOutcome, RunnerError> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| RunnerError::UnknownPlugin(name.to_string()))?;

        let schemas = self.registry.schemas();
        let input = schemas.new_map(descriptor.inputs().iter().map(String::as_str))?;
        let output = schemas.new_map(descriptor.outputs().iter().map(String::as_str))?;

        let session = PluginSession::new(name, input, Some(output), Arc::clone(&self.dialer))
            .with_config(&self.config);
        let mut connected = session.connect(&self.config.workflow_address).await?;

        if connected.is_finished() {
            connected.complete(None).await?;
            return Ok(RunOutcome::AlreadyCompleted);
        }

        let main = descriptor.main();
        let result = {
            let (input, output) = connected.split_mut();
            match output {
                Some(output) => main.run(input, output).await,
                None => main.run(input, &mut SchemaMap::new()).await,
            }
        };

        match result {
            Ok(()) => {
                connected.complete(None).await?;
                Ok(RunOutcome::Completed)
            }
            Err(source) => {
                let report = format!("{:#}", source);
                let failure: &(dyn fmt::Display + Sync) = &report;
                connected.complete(Some(failure)).await?;
                Err(RunnerError::Plugin {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}
