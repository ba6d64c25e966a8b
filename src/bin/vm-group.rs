// Copyright (c) 2025 - Cowboy AI, Inc.
//! VM group provisioning CLI
//!
//! Drives create, update, test and delete of a VM group's Heat stack
//! through the `openstack` client.
//!
//! # Environment
//!
//! - `MEX_NETWORK_SCHEME`: network scheme for graphs without a net spec
//! - `MEX_NETWORK`: shared network of the cloudlet
//! - `HEAT_TEMPLATE_DIR`: where `<group>-heat.yaml` documents go
//! - `HEAT_POLL_INTERVAL_SECS` / `HEAT_STACK_TIMEOUT_SECS`
//! - `OPENSTACK_CLI` / `OPENSTACK_CMD_TIMEOUT_SECS`
//! - `HEAT_TEST_MODE`: render only
//! - `OS_*`: OpenStack credentials, passed through to the client
//!
//! # Usage
//!
//! ```bash
//! vm-group create cluster1.json
//! vm-group test cluster1.json --template-dir /tmp/heat
//! vm-group delete cluster1
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use cim_vm_provisioner::{
    HeatVmGroupService, ProvisionerConfig, ReservationRegistry, ResourceGraph, VmGroupService,
};

#[derive(Debug, Parser)]
#[command(name = "vm-group", about = "Provision VM groups as Heat stacks")]
struct Cli {
    /// Override HEAT_TEMPLATE_DIR
    #[arg(long, global = true)]
    template_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the group's stack from a resource graph file
    Create { graph: PathBuf },
    /// Update the group's stack from a resource graph file
    Update { graph: PathBuf },
    /// Resolve and render without touching the backend
    Test { graph: PathBuf },
    /// Delete the group's stack
    Delete { group: String },
}

fn load_graph(path: &Path, config: &ProvisionerConfig) -> Result<ResourceGraph> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read resource graph {}", path.display()))?;
    let mut graph: ResourceGraph = serde_json::from_str(&raw)
        .with_context(|| format!("cannot parse resource graph {}", path.display()))?;
    if graph.net_spec.is_none() {
        graph.net_spec = Some(config.net_spec()?);
    }
    Ok(graph)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ProvisionerConfig::from_env()?;
    if let Some(dir) = cli.template_dir {
        config.template_dir = dir;
    }
    info!(
        network = ?config.mex_network,
        template_dir = %config.template_dir.display(),
        test_mode = config.test_mode,
        "configuration loaded"
    );

    let backend = Arc::new(config.openstack_cli());
    let registry = Arc::new(ReservationRegistry::new());
    let service = HeatVmGroupService::new(backend, registry, &config)?;

    let cancel = service.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let result = match cli.command {
        Command::Create { graph } => service.create_vms(load_graph(&graph, &config)?).await,
        Command::Update { graph } => service.update_vms(load_graph(&graph, &config)?).await,
        Command::Test { graph } => {
            let path = service.test_vms(load_graph(&graph, &config)?).await?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Delete { group } => service.delete_vms(&group).await,
    };

    if let Err(e) = &result {
        error!(kind = ?e.kind(), retryable = e.is_retryable(), "{}", e);
    }
    result?;
    info!("done");
    Ok(())
}
