//! Wire messages exchanged between joining and managing nodes

use borsh::{BorshDeserialize, BorshSerialize};
use join_types::{CommunicationNetwork, GenesisConfig};
use serde::{Deserialize, Serialize};

/// Message types for the handshake session
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum NetworkMessage {
    /// Joining node asking to become a member
    JoinRequest { node_address: String },

    /// Managing node accepting a join
    JoinAccepted { network: CommunicationNetwork },

    /// Managing node refusing a join
    JoinRejected { reason: String },

    /// Joining node asking for the genesis parameters
    GenesisRequest { session_id: String },

    /// Managing node answering a genesis request
    GenesisResponse { genesis: GenesisConfig },

    /// A node asking every member for its enode
    EnodeRequest { requester: String },

    /// A member answering an enode request
    EnodeResponse { enode: String },

    /// A member announcing its enode unprompted
    EnodeAnnouncement { enode: String },

    /// Keep the session alive
    Heartbeat,
}

impl NetworkMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("NetworkMessage serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }

    /// Whether the managing node relays this message to every member
    pub fn is_relayed(&self) -> bool {
        matches!(
            self,
            NetworkMessage::EnodeRequest { .. }
                | NetworkMessage::EnodeResponse { .. }
                | NetworkMessage::EnodeAnnouncement { .. }
        )
    }
}
