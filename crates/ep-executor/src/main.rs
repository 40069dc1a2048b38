//! ep executor
//!
//! Runs one helper operation against the nodes of a cluster described in
//! the executor configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ep_core::config::{self, ExecutorConfig};
use ep_core::{NodeInfo, NodeTopology, DAY0_ROLE};
use ep_executor::{Executor, Operation, SshTransport};

#[derive(Parser)]
#[command(name = "ep-executor")]
#[command(about = "Run a helper operation across cluster nodes")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Roles selecting the target nodes (comma separated)
    #[arg(short, long, value_delimiter = ',', default_value = DAY0_ROLE)]
    roles: Vec<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Helper to run: shell, interactive-shell, copy-from-day0, copy-to-day0,
    /// push-image, push-file, pull-file, create-registry-projects
    helper: String,

    /// Helper arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn build_topology(config: &ExecutorConfig) -> Result<NodeTopology> {
    let mut nodes = Vec::with_capacity(config.nodes.len());
    for node in &config.nodes {
        let transport = SshTransport::from_config(node, &config.ssh)
            .with_context(|| format!("Failed to set up transport for {}", node.ip))?;
        nodes.push(NodeInfo::new(
            node.ip.clone(),
            node.roles.iter().cloned(),
            Arc::new(transport),
        ));
    }
    NodeTopology::new(nodes).context("Invalid node topology")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_dir().join("executor.toml"));
    let config: ExecutorConfig = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.validate().context("Invalid executor configuration")?;

    let topology = build_topology(&config)?;
    let executor = Executor::from_config(topology, &config);
    let operation = Operation::parse(&args.helper, args.args)?;

    let roles: Vec<&str> = args.roles.iter().map(String::as_str).collect();
    tracing::debug!(helper = %args.helper, roles = ?roles, "Parsed invocation");

    executor
        .execute(&roles, operation)
        .await
        .with_context(|| format!("{} failed", args.helper))?;

    Ok(())
}
