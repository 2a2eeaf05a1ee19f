//! Scripted collaborators for pipeline and flow tests

use crate::keys::LocalKeyGenerator;
use crate::messaging_config::MessagingConfigWriter;
use crate::pipeline::Collaborators;
use crate::supervisor::{NodeSupervisor, SupervisorConfig};
use crate::workspace::LocalWorkspace;
use async_trait::async_trait;
use join_types::{
    AccountGenerator, Address, CommunicationNetwork, GenesisConfig, InputError, LinkInfo,
    ListenerPhase, Monitoring, NetworkJoin, NodeEndpoint, NodeLink, PeerRegistry, Prompt,
    Prompter, ProvisionError,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ENODE: &str = "enode://f00d@10.0.0.2:20000";

pub fn network() -> CommunicationNetwork {
    CommunicationNetwork {
        managing_node: "10.0.0.1".to_string(),
        session_id: "10.0.0.2-1".to_string(),
        topic: "enodes".to_string(),
        known_peers: vec!["enode://beef@10.0.0.1:20000".to_string()],
    }
}

/// What the operator saw and was asked, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Ask(Prompt),
    Inform(String),
}

/// Answers prompts from a fixed list
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<Exchange>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub fn transcript(&self) -> Vec<Exchange> {
        self.transcript.lock().clone()
    }

    pub fn asked(&self) -> Vec<Prompt> {
        self.transcript
            .lock()
            .iter()
            .filter_map(|exchange| match exchange {
                Exchange::Ask(prompt) => Some(*prompt),
                Exchange::Inform(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, prompt: Prompt) -> Result<String, InputError> {
        self.transcript.lock().push(Exchange::Ask(prompt));
        self.answers.lock().pop_front().ok_or(InputError::Closed)
    }

    fn inform(&self, message: &str) {
        self.transcript.lock().push(Exchange::Inform(message.to_string()));
    }
}

/// Mints predictable addresses and counts how often it was asked to
#[derive(Default)]
pub struct CountingAccounts {
    calls: AtomicUsize,
}

impl CountingAccounts {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountGenerator for CountingAccounts {
    async fn new_account(&self) -> Result<Address, ProvisionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Address::from_bytes(&[n as u8; 20]))
    }
}

/// Managing node stand-in
#[derive(Default)]
pub struct ScriptedNetwork {
    pub reject: bool,
    joins: AtomicUsize,
}

impl ScriptedNetwork {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkJoin for ScriptedNetwork {
    async fn join_network(
        &self,
        remote_address: &str,
    ) -> Result<CommunicationNetwork, ProvisionError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(ProvisionError::Handshake(format!(
                "{} refused the connection",
                remote_address
            )));
        }
        Ok(network())
    }

    async fn genesis_config(
        &self,
        network: &CommunicationNetwork,
    ) -> Result<GenesisConfig, ProvisionError> {
        assert_eq!(network.session_id, "10.0.0.2-1");
        Ok(GenesisConfig {
            network_id: 1981,
            genesis_json: r#"{"config":{"chainId":1981}}"#.to_string(),
        })
    }
}

#[derive(Default)]
pub struct ScriptedNode {
    pub connected_to: Mutex<Option<NodeEndpoint>>,
}

#[async_trait]
impl NodeLink for ScriptedNode {
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<LinkInfo, ProvisionError> {
        *self.connected_to.lock() = Some(endpoint.clone());
        Ok(LinkInfo {
            client_version: "Geth/v1.5.0-unstable".to_string(),
            enode: ENODE.to_string(),
        })
    }

    async fn add_peer(&self, _enode: &str) -> Result<bool, ProvisionError> {
        Ok(true)
    }

    async fn balance(&self, _account: &Address) -> Result<u128, ProvisionError> {
        Ok(0)
    }

    async fn block_number(&self) -> Result<u64, ProvisionError> {
        Ok(0)
    }

    async fn peer_count(&self) -> Result<u64, ProvisionError> {
        Ok(1)
    }
}

/// Records every registration in order
#[derive(Default)]
pub struct RecordingPeers {
    calls: Mutex<Vec<String>>,
}

impl RecordingPeers {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PeerRegistry for RecordingPeers {
    async fn listen_for_enodes(
        &self,
        phase: ListenerPhase,
        _network: &CommunicationNetwork,
    ) -> Result<(), ProvisionError> {
        self.calls.lock().push(format!("listen:{:?}", phase));
        Ok(())
    }

    async fn add_enode_request_handler(
        &self,
        _network: &CommunicationNetwork,
        link: &LinkInfo,
    ) -> Result<(), ProvisionError> {
        self.calls.lock().push(format!("request:{}", link.enode));
        Ok(())
    }

    async fn add_enode_response_handler(
        &self,
        _network: &CommunicationNetwork,
    ) -> Result<(), ProvisionError> {
        self.calls.lock().push("response".to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMonitoring {
    pub accounts: Mutex<Option<Vec<Address>>>,
    pub endpoint: Mutex<Option<NodeEndpoint>>,
}

#[async_trait]
impl Monitoring for RecordingMonitoring {
    async fn monitor_balances(&self, accounts: &[Address]) -> Result<(), ProvisionError> {
        *self.accounts.lock() = Some(accounts.to_vec());
        Ok(())
    }

    async fn collect_statistics(&self, endpoint: &NodeEndpoint) -> Result<(), ProvisionError> {
        *self.endpoint.lock() = Some(endpoint.clone());
        Ok(())
    }
}

/// A workspace root plus the scripted collaborators wired into a join
pub struct Harness {
    pub root: tempfile::TempDir,
    pub prompter: Arc<ScriptedPrompter>,
    pub accounts: Arc<CountingAccounts>,
    pub network: Arc<ScriptedNetwork>,
    pub node: Arc<ScriptedNode>,
    pub peers: Arc<RecordingPeers>,
    pub monitoring: Arc<RecordingMonitoring>,
}

impl Harness {
    pub fn new(answers: &[&str]) -> Self {
        Self::with_network(answers, ScriptedNetwork::default())
    }

    pub fn with_network(answers: &[&str], network: ScriptedNetwork) -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            prompter: Arc::new(ScriptedPrompter::new(answers)),
            accounts: Arc::new(CountingAccounts::default()),
            network: Arc::new(network),
            node: Arc::new(ScriptedNode::default()),
            peers: Arc::new(RecordingPeers::default()),
            monitoring: Arc::new(RecordingMonitoring::default()),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn scripts_dir(&self) -> std::path::PathBuf {
        self.root().join("scripts")
    }

    /// Install a node start script that runs `body`
    #[cfg(unix)]
    pub fn script(&self, file_name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let dir = self.scripts_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file_name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            workspace: Arc::new(LocalWorkspace::new(self.root())),
            keys: Arc::new(LocalKeyGenerator::new(self.root())),
            accounts: self.accounts.clone(),
            config: Arc::new(MessagingConfigWriter::new(self.root())),
            prompter: self.prompter.clone(),
            network: self.network.clone(),
            supervisor: Arc::new(NodeSupervisor::new(SupervisorConfig {
                scripts_dir: self.scripts_dir(),
                working_dir: self.root().to_path_buf(),
                startup_timeout: Duration::from_secs(5),
            })),
            node: self.node.clone(),
            peers: self.peers.clone(),
            monitoring: self.monitoring.clone(),
        }
    }
}
