//! The provisioning stages other than configuration collection

use crate::stage::Stage;
use crate::supervisor::{NodeScript, NodeSupervisor};
use async_trait::async_trait;
use join_types::{
    ConfigAssembler, JoinContext, KeyGenerator, ListenerPhase, Monitoring, NetworkJoin,
    NodeEndpoint, NodeLink, PeerRegistry, ProvisionError, Workspace, BLOCKCHAIN_FOLDER,
};
use std::sync::Arc;

/// File the resolved genesis block is written to
pub const GENESIS_FILE: &str = "genesis.json";

/// `clear_workspace`: remove the working folders left by an earlier run
pub struct ClearWorkspace {
    workspace: Arc<dyn Workspace>,
}

impl ClearWorkspace {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Stage for ClearWorkspace {
    fn name(&self) -> &'static str {
        "clear_workspace"
    }

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        self.workspace.clear(&ctx.workspace_folders).await?;
        Ok(ctx)
    }
}

/// `create_workspace`
pub struct CreateWorkspace {
    workspace: Arc<dyn Workspace>,
}

impl CreateWorkspace {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Stage for CreateWorkspace {
    fn name(&self) -> &'static str {
        "create_workspace"
    }

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        self.workspace.create(&ctx.workspace_folders).await?;
        Ok(ctx)
    }
}

/// `generate_keys`: secure-messaging key pairs
pub struct GenerateKeys {
    keys: Arc<dyn KeyGenerator>,
}

impl GenerateKeys {
    pub fn new(keys: Arc<dyn KeyGenerator>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl Stage for GenerateKeys {
    fn name(&self) -> &'static str {
        "generate_keys"
    }

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        self.keys.create_keys(&ctx.key_material).await?;
        Ok(ctx)
    }
}

/// `assemble_config`: secure-messaging node configuration
pub struct AssembleConfig {
    assembler: Arc<dyn ConfigAssembler>,
}

impl AssembleConfig {
    pub fn new(assembler: Arc<dyn ConfigAssembler>) -> Self {
        Self { assembler }
    }
}

#[async_trait]
impl Stage for AssembleConfig {
    fn name(&self) -> &'static str {
        "assemble_config"
    }

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        let path = self.assembler.assemble(&ctx.config_spec).await?;
        tracing::debug!("Messaging config written to {}", path.display());
        Ok(ctx)
    }
}

/// `resolve_genesis`: fetch the genesis block from the network and store it
pub struct ResolveGenesis {
    network: Arc<dyn NetworkJoin>,
    workspace: Arc<dyn Workspace>,
}

impl ResolveGenesis {
    pub fn new(network: Arc<dyn NetworkJoin>, workspace: Arc<dyn Workspace>) -> Self {
        Self { network, workspace }
    }
}

#[async_trait]
impl Stage for ResolveGenesis {
    fn name(&self) -> &'static str {
        "resolve_genesis"
    }

    async fn execute(&self, mut ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        let genesis = self
            .network
            .genesis_config(&ctx.communication_network)
            .await?;

        self.workspace
            .write_file(BLOCKCHAIN_FOLDER, GENESIS_FILE, genesis.genesis_json.as_bytes())
            .await?;
        tracing::info!("Resolved genesis for network {}", genesis.network_id);

        ctx.set_genesis(genesis)?;
        Ok(ctx)
    }
}

/// `launch_node`: run the role's start script
pub struct LaunchNode {
    script: NodeScript,
    supervisor: Arc<NodeSupervisor>,
}

impl LaunchNode {
    pub fn new(script: NodeScript, supervisor: Arc<NodeSupervisor>) -> Self {
        Self { script, supervisor }
    }
}

#[async_trait]
impl Stage for LaunchNode {
    fn name(&self) -> &'static str {
        "launch_node"
    }

    async fn execute(&self, mut ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        // The node reads genesis.json on first start
        ctx.genesis()?;

        let spec = self.supervisor.launch_spec(self.script, &ctx)?;
        let node = self.supervisor.launch(&spec).await?;

        ctx.set_node_endpoint(NodeEndpoint {
            ipc_path: ctx.node_defaults.ipc_path.clone(),
            rpc_url: ctx.node_defaults.rpc_url.clone(),
            pid: node.pid,
        })?;
        Ok(ctx)
    }
}

/// `link_node`: outbound link to the launched node
pub struct LinkNode {
    node: Arc<dyn NodeLink>,
}

impl LinkNode {
    pub fn new(node: Arc<dyn NodeLink>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl Stage for LinkNode {
    fn name(&self) -> &'static str {
        "link_node"
    }

    async fn execute(&self, mut ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        let link = self.node.connect(ctx.node_endpoint()?).await?;
        tracing::info!("Linked to {} ({})", link.client_version, link.enode);
        ctx.set_node_link(link)?;
        Ok(ctx)
    }
}

/// `listen_for_enodes`, armed once per phase
pub struct ListenForEnodes {
    phase: ListenerPhase,
    peers: Arc<dyn PeerRegistry>,
}

impl ListenForEnodes {
    pub fn new(phase: ListenerPhase, peers: Arc<dyn PeerRegistry>) -> Self {
        Self { phase, peers }
    }
}

#[async_trait]
impl Stage for ListenForEnodes {
    fn name(&self) -> &'static str {
        "listen_for_enodes"
    }

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        // Peers are added through the node link
        ctx.node_link()?;
        self.peers
            .listen_for_enodes(self.phase, &ctx.communication_network)
            .await?;
        Ok(ctx)
    }
}

/// `enode_request_handler`: answer other nodes with our enode
pub struct EnodeRequestHandler {
    peers: Arc<dyn PeerRegistry>,
}

impl EnodeRequestHandler {
    pub fn new(peers: Arc<dyn PeerRegistry>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl Stage for EnodeRequestHandler {
    fn name(&self) -> &'static str {
        "enode_request_handler"
    }

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        self.peers
            .add_enode_request_handler(&ctx.communication_network, ctx.node_link()?)
            .await?;
        Ok(ctx)
    }
}

/// `enode_response_handler`: add the enodes other nodes send back
pub struct EnodeResponseHandler {
    peers: Arc<dyn PeerRegistry>,
}

impl EnodeResponseHandler {
    pub fn new(peers: Arc<dyn PeerRegistry>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl Stage for EnodeResponseHandler {
    fn name(&self) -> &'static str {
        "enode_response_handler"
    }

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        ctx.node_link()?;
        self.peers
            .add_enode_response_handler(&ctx.communication_network)
            .await?;
        Ok(ctx)
    }
}

/// `monitor_balances` of the maker and voter accounts
pub struct MonitorBalances {
    monitoring: Arc<dyn Monitoring>,
}

impl MonitorBalances {
    pub fn new(monitoring: Arc<dyn Monitoring>) -> Self {
        Self { monitoring }
    }
}

#[async_trait]
impl Stage for MonitorBalances {
    fn name(&self) -> &'static str {
        "monitor_balances"
    }

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        self.monitoring.monitor_balances(&ctx.all_accounts()).await?;
        Ok(ctx)
    }
}

/// `collect_statistics` from the node
pub struct CollectStatistics {
    monitoring: Arc<dyn Monitoring>,
}

impl CollectStatistics {
    pub fn new(monitoring: Arc<dyn Monitoring>) -> Self {
        Self { monitoring }
    }
}

#[async_trait]
impl Stage for CollectStatistics {
    fn name(&self) -> &'static str {
        "collect_statistics"
    }

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        self.monitoring
            .collect_statistics(ctx.node_endpoint()?)
            .await?;
        Ok(ctx)
    }
}
