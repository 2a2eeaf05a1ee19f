//! Consortium Joiner
//!
//! Main entry point for provisioning a node into an existing consortium network.
//! Supports join mode (provision and start a node through a managing node) and
//! manage mode (run the handshake server a managing node exposes).

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use join_handshake::{EnodeExchange, ManagingNodeServer, WsNetworkJoin, DEFAULT_HANDSHAKE_PORT};
use join_provisioner::{
    Collaborators, JoinFlow, LocalAccountGenerator, LocalKeyGenerator, LocalWorkspace,
    MessagingConfigWriter, NodeSupervisor,
};
use join_types::{GenesisConfig, NodeLink};
use node_link::{NodeMonitor, RpcLinkConfig, RpcNodeLink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod prompter;

use config::JoinerConfig;
use prompter::TerminalPrompter;

/// Node mode
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Join mode - provision this machine into a network
    Join,
    /// Manage mode - accept joining nodes
    Manage,
}

/// Consortium network joiner
#[derive(Parser, Debug)]
#[command(name = "consortium-join")]
#[command(about = "Provision a node into an existing consortium network", long_about = None)]
struct Args {
    /// Node mode (join or manage)
    #[arg(long, value_enum, default_value = "join")]
    mode: Mode,

    /// Directory the node is provisioned into
    #[arg(long, default_value = ".")]
    workspace_root: PathBuf,

    /// Directory holding the node start scripts
    #[arg(long, default_value = ".")]
    scripts_dir: PathBuf,

    /// Address this node is reachable at
    #[arg(long, default_value = "127.0.0.1")]
    local_address: String,

    /// Managing node handshake port
    #[arg(long, default_value_t = DEFAULT_HANDSHAKE_PORT)]
    handshake_port: u16,

    /// Seconds to wait for each handshake response
    #[arg(long, default_value = "30")]
    response_timeout: u64,

    /// Node JSON-RPC endpoint
    #[arg(long, default_value = join_types::DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Node IPC endpoint
    #[arg(long, default_value = join_types::DEFAULT_IPC_PATH)]
    ipc_path: String,

    /// Seconds the node gets to signal startup
    #[arg(long, default_value = "100")]
    startup_timeout: u64,

    /// Seconds between balance checks
    #[arg(long, default_value = "10")]
    balance_interval: u64,

    /// Seconds between statistics samples
    #[arg(long, default_value = "5")]
    statistics_interval: u64,

    /// Write the joined networks record to this file as well as stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Genesis document handed to joining nodes (manage mode)
    #[arg(long, default_value = "genesis.json")]
    genesis: PathBuf,

    /// Network id handed to joining nodes (manage mode)
    #[arg(long, default_value = "1981")]
    network_id: u64,

    /// Enode exchange topic (manage mode)
    #[arg(long, default_value = "enodes")]
    topic: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> JoinerConfig {
        JoinerConfig {
            workspace_root: self.workspace_root.clone(),
            scripts_dir: self.scripts_dir.clone(),
            local_address: self.local_address.clone(),
            handshake_port: self.handshake_port,
            response_timeout_secs: self.response_timeout,
            rpc_url: self.rpc_url.clone(),
            ipc_path: self.ipc_path.clone(),
            startup_timeout_secs: self.startup_timeout,
            balance_interval_secs: self.balance_interval,
            statistics_interval_secs: self.statistics_interval,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.mode {
        Mode::Join => run_join(args).await,
        Mode::Manage => run_manage(args).await,
    }
}

/// Run in join mode - provision and start the node, then keep it peered
async fn run_join(args: Args) -> Result<()> {
    let config = args.config();
    tracing::info!("Starting consortium join");
    tracing::info!("  Workspace: {:?}", config.workspace_root);
    tracing::info!("  Scripts: {:?}", config.scripts_dir);
    tracing::info!("  Local address: {}", config.local_address);
    tracing::info!("  Node RPC: {}", config.rpc_url);

    let root = config.workspace_root.clone();
    let network = Arc::new(WsNetworkJoin::new(config.handshake()));
    let node: Arc<dyn NodeLink> = Arc::new(RpcNodeLink::new(RpcLinkConfig::default()));
    let peers = Arc::new(EnodeExchange::new(network.clone(), node.clone()));
    let monitor = Arc::new(NodeMonitor::new(node.clone(), config.monitor()));

    let collaborators = Collaborators {
        workspace: Arc::new(LocalWorkspace::new(&root)),
        keys: Arc::new(LocalKeyGenerator::new(&root)),
        accounts: Arc::new(LocalAccountGenerator::new(&root)),
        config: Arc::new(MessagingConfigWriter::new(&root)),
        prompter: Arc::new(TerminalPrompter::stdin()),
        network: network.clone(),
        supervisor: Arc::new(NodeSupervisor::new(config.supervisor())),
        node,
        peers: peers.clone(),
        monitoring: monitor.clone(),
    };

    let joined = JoinFlow::new(collaborators, config.flow_settings())
        .run()
        .await
        .context("join failed")?;

    let record = serde_json::to_string_pretty(&joined)?;
    println!("{}", record);
    if let Some(path) = &args.output {
        tokio::fs::write(path, &record)
            .await
            .with_context(|| format!("failed to write {:?}", path))?;
        tracing::info!("Joined networks written to {:?}", path);
    }

    tracing::info!(
        "Joined. Exchanging enodes with {} listeners armed.",
        peers.armed_listeners()
    );
    tracing::info!("Press Ctrl+C to stop.");

    // Listeners and monitors run until shutdown
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    let stats = monitor.statistics();
    tracing::info!(
        "Final statistics: block {}, {} peers, {} samples ({} failed)",
        stats.block_number,
        stats.peer_count,
        stats.samples,
        stats.failed_samples
    );
    monitor.stop();

    tracing::info!("Joiner stopped (the node keeps running)");

    Ok(())
}

/// Run in manage mode - hand out the network to joining nodes
async fn run_manage(args: Args) -> Result<()> {
    tracing::info!("Starting consortium join - MANAGE MODE");
    tracing::info!("  Genesis: {:?}", args.genesis);
    tracing::info!("  Network id: {}", args.network_id);

    let genesis_json = tokio::fs::read_to_string(&args.genesis)
        .await
        .with_context(|| format!("failed to read genesis {:?}", args.genesis))?;
    let genesis = GenesisConfig {
        network_id: args.network_id,
        genesis_json,
    };

    let server = ManagingNodeServer::new(&args.topic, genesis);
    let addr = server
        .start(&format!("0.0.0.0:{}", args.handshake_port))
        .await?;

    tracing::info!("Managing node running. Joining nodes can connect to {}.", addr);
    tracing::info!("Press Ctrl+C to stop.");

    let mut heartbeat = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                server.broadcast_heartbeat();
                let stats = server.stats();
                tracing::info!(
                    "{} members over {} connections, {} messages relayed",
                    stats.members,
                    stats.connections,
                    stats.messages_relayed
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down managing node...");
                break;
            }
        }
    }

    tracing::info!("Managing node stopped ({} peers known)", server.known_peers().len());

    Ok(())
}
