//! Handshake descriptors and node endpoints

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Communication network handed out by the managing node on join
///
/// Opaque to the pipeline: it is forwarded unchanged to the peer and
/// monitoring collaborators and returned to the caller.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct CommunicationNetwork {
    /// Managing node the handshake was made with
    pub managing_node: String,
    /// Session identifier assigned by the managing node
    pub session_id: String,
    /// Topic peers use to exchange enodes
    pub topic: String,
    /// Peers already known to the managing node
    pub known_peers: Vec<String>,
}

/// Genesis parameters resolved from the network
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct GenesisConfig {
    /// Network (chain) id
    pub network_id: u64,
    /// Genesis block document, written verbatim to `genesis.json`
    pub genesis_json: String,
}

/// Where the launched node can be reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub ipc_path: String,
    pub rpc_url: String,
    /// Process id of the launched node, when the platform reports one
    pub pid: Option<u32>,
}

/// Result of establishing the outbound link to the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub client_version: String,
    /// This node's enode URL, advertised to peers
    pub enode: String,
}
