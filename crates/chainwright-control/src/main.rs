//! Chainwright control binary.
//!
//! Runs one topology workflow against the catalog and prints its outcome.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chainwright_control::{
    AddNodesRequest, ControlConfig, ControlService, DeployChainRequest, NodeId, RunMode,
    StoreBackend, WorkflowOutcome,
};

#[derive(Parser)]
#[command(name = "chainwright")]
#[command(about = "Provision and evolve multi-host ledger networks")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "CHAINWRIGHT_CONFIG", default_value = "chainwright.toml")]
    config: PathBuf,

    /// Use a throwaway in-memory catalog instead of PostgreSQL
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a chain from a topology file
    DeployChain {
        /// Unique chain name
        #[arg(long)]
        chain: String,

        /// Image tag id
        #[arg(long)]
        tag_id: i32,

        /// File with one topology line per host assignment
        #[arg(long)]
        topology: PathBuf,

        /// Root directory for generated files on every host
        #[arg(long)]
        root_dir: String,

        /// External signer address embedded in front configs
        #[arg(long, default_value = "")]
        signer_addr: String,

        /// How fronts run on their hosts (docker or host)
        #[arg(long, default_value = "docker")]
        run_mode: RunMode,
    },

    /// Add nodes on one host to a group
    AddNodes {
        /// Target chain
        #[arg(long)]
        chain: String,

        /// Target group; created if missing
        #[arg(long)]
        group_id: i32,

        /// Host address
        #[arg(long)]
        ip: String,

        /// Number of nodes to add
        #[arg(long)]
        count: i64,

        /// Agency for a host the chain does not know yet
        #[arg(long)]
        agency: Option<String>,
    },

    /// Delete a stopped node
    DeleteNode {
        /// Node id
        #[arg(long)]
        node_id: String,

        /// Also delete the host if it has no fronts left
        #[arg(long)]
        delete_host: bool,

        /// Also delete the agency if it has no hosts left
        #[arg(long)]
        delete_agency: bool,
    },

    /// Move a chain to another image and restart it
    Upgrade {
        /// Target chain
        #[arg(long)]
        chain: String,

        /// New image tag id
        #[arg(long)]
        tag_id: i32,
    },

    /// Delete a chain with no running nodes
    DeleteChain {
        /// Target chain
        #[arg(long)]
        chain: String,
    },

    /// Start one node's front
    StartNode {
        /// Node id
        #[arg(long)]
        node_id: String,
    },

    /// Stop one node's front
    StopNode {
        /// Node id
        #[arg(long)]
        node_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    match run(Cli::parse()).await {
        Ok(outcome) => {
            match serde_json::to_string_pretty(&outcome) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(error = %e, "failed to encode outcome"),
            }
            if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<WorkflowOutcome> {
    if !cli.config.exists() {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }
    let config = ControlConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let backend = if cli.memory {
        StoreBackend::Memory
    } else {
        StoreBackend::Postgres
    };
    let service = ControlService::start(&config, backend)
        .await
        .context("starting control service")?;
    let manager = service.manager();

    let result = match cli.command {
        Commands::DeployChain {
            chain,
            tag_id,
            topology,
            root_dir,
            signer_addr,
            run_mode,
        } => {
            let lines = std::fs::read_to_string(&topology)
                .with_context(|| format!("reading {}", topology.display()))?
                .lines()
                .map(ToOwned::to_owned)
                .collect();
            manager
                .deploy_chain(&DeployChainRequest {
                    chain_name: chain,
                    tag_id,
                    lines,
                    root_dir,
                    signer_addr,
                    run_mode,
                })
                .await
        }
        Commands::AddNodes {
            chain,
            group_id,
            ip,
            count,
            agency,
        } => {
            manager
                .deploy_nodes(&AddNodesRequest {
                    chain_name: chain,
                    group_id,
                    ip,
                    agency_name: agency,
                    count,
                })
                .await
        }
        Commands::DeleteNode {
            node_id,
            delete_host,
            delete_agency,
        } => {
            manager
                .delete_node(&NodeId::new(node_id), delete_host, delete_agency)
                .await
        }
        Commands::Upgrade { chain, tag_id } => manager.upgrade(&chain, tag_id).await,
        Commands::DeleteChain { chain } => manager.delete_chain(&chain).await,
        Commands::StartNode { node_id } => manager.start_node(&NodeId::new(node_id)).await,
        Commands::StopNode { node_id } => manager.stop_node(&NodeId::new(node_id)).await,
    };

    if let Err(e) = &result {
        warn!(error = %e, kind = %e.kind(), "workflow failed");
    }
    service.shutdown().await;
    Ok(WorkflowOutcome::from(result))
}
