//! Collaborator traits
//!
//! The pipeline only talks to the outside world through these seams. Each has
//! a concrete implementation elsewhere in the workspace and a scripted one in
//! the tests.

use crate::context::{KeySpec, MessagingConfigSpec};
use crate::error::{InputError, ProvisionError};
use crate::network::{CommunicationNetwork, GenesisConfig, LinkInfo, NodeEndpoint};
use crate::prompt::Prompt;
use crate::role::Address;
use async_trait::async_trait;
use std::path::PathBuf;

/// On-disk working directories
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Remove the folders and everything under them (missing folders are fine)
    async fn clear(&self, folders: &[String]) -> Result<(), ProvisionError>;

    /// Create the folders
    async fn create(&self, folders: &[String]) -> Result<(), ProvisionError>;

    /// Write a file into one of the folders, returning its path
    async fn write_file(
        &self,
        folder: &str,
        file_name: &str,
        contents: &[u8],
    ) -> Result<PathBuf, ProvisionError>;
}

/// Secure-messaging key material
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    async fn create_keys(&self, keys: &[KeySpec]) -> Result<(), ProvisionError>;
}

/// Blockchain account minting
#[async_trait]
pub trait AccountGenerator: Send + Sync {
    async fn new_account(&self) -> Result<Address, ProvisionError>;
}

/// Secure-messaging node configuration
#[async_trait]
pub trait ConfigAssembler: Send + Sync {
    async fn assemble(&self, spec: &MessagingConfigSpec) -> Result<PathBuf, ProvisionError>;
}

/// Interactive operator input
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask one question and wait for the answer
    async fn ask(&self, prompt: Prompt) -> Result<String, InputError>;

    /// Show guidance to the operator
    fn inform(&self, message: &str);
}

/// Handshake with a managing node
#[async_trait]
pub trait NetworkJoin: Send + Sync {
    async fn join_network(&self, remote_address: &str)
        -> Result<CommunicationNetwork, ProvisionError>;

    async fn genesis_config(
        &self,
        network: &CommunicationNetwork,
    ) -> Result<GenesisConfig, ProvisionError>;
}

/// Outbound link to the launched node
#[async_trait]
pub trait NodeLink: Send + Sync {
    /// Connect to the node and identify it
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<LinkInfo, ProvisionError>;

    /// Ask the node to dial a peer; returns whether the node accepted it
    async fn add_peer(&self, enode: &str) -> Result<bool, ProvisionError>;

    /// Balance of an account in wei
    async fn balance(&self, account: &Address) -> Result<u128, ProvisionError>;

    async fn block_number(&self) -> Result<u64, ProvisionError>;

    async fn peer_count(&self) -> Result<u64, ProvisionError>;
}

/// When an enode listener is armed relative to handshake handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerPhase {
    PreHandshake,
    PostHandshake,
}

/// Peer discovery over the communication network
#[async_trait]
pub trait PeerRegistry: Send + Sync {
    /// Arm the listener that adds announced enodes as peers, replacing any
    /// listener armed in an earlier phase
    async fn listen_for_enodes(
        &self,
        phase: ListenerPhase,
        network: &CommunicationNetwork,
    ) -> Result<(), ProvisionError>;

    /// Answer enode requests from other nodes with our own enode
    async fn add_enode_request_handler(
        &self,
        network: &CommunicationNetwork,
        link: &LinkInfo,
    ) -> Result<(), ProvisionError>;

    /// Add the enodes other nodes send back as peers
    async fn add_enode_response_handler(
        &self,
        network: &CommunicationNetwork,
    ) -> Result<(), ProvisionError>;
}

/// Background monitors started after the node is up
#[async_trait]
pub trait Monitoring: Send + Sync {
    async fn monitor_balances(&self, accounts: &[Address]) -> Result<(), ProvisionError>;

    async fn collect_statistics(&self, endpoint: &NodeEndpoint) -> Result<(), ProvisionError>;
}
