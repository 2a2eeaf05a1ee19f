//! Network join - the joining node's side of the handshake

use crate::client::HandshakeClient;
use crate::message::NetworkMessage;
use crate::{DEFAULT_HANDSHAKE_PORT, DEFAULT_RESPONSE_TIMEOUT_SECS};
use async_trait::async_trait;
use join_types::{CommunicationNetwork, GenesisConfig, NetworkJoin, ProvisionError};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Handshake settings
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Address this node announces itself with
    pub local_address: String,
    /// Port the managing node's handshake server listens on
    pub port: u16,
    /// Upper bound on each request/response round-trip
    pub response_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            local_address: "127.0.0.1".to_string(),
            port: DEFAULT_HANDSHAKE_PORT,
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS),
        }
    }
}

/// Joins a network over a WebSocket handshake session
///
/// The session opened by `join_network` stays up and is shared with the
/// genesis request and the enode exchange.
pub struct WsNetworkJoin {
    config: HandshakeConfig,
    /// Session with the managing node, once joined
    client: RwLock<Option<Arc<HandshakeClient>>>,
}

impl WsNetworkJoin {
    pub fn new(config: HandshakeConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    /// Session opened by a successful join
    pub fn session(&self) -> Option<Arc<HandshakeClient>> {
        self.client.read().clone()
    }

    fn server_addr(&self, remote_address: &str) -> String {
        if remote_address.contains(':') {
            remote_address.to_string()
        } else {
            format!("{}:{}", remote_address, self.config.port)
        }
    }
}

#[async_trait]
impl NetworkJoin for WsNetworkJoin {
    async fn join_network(
        &self,
        remote_address: &str,
    ) -> Result<CommunicationNetwork, ProvisionError> {
        let addr = self.server_addr(remote_address);
        tracing::info!("Joining network through managing node {}", addr);

        let client = HandshakeClient::connect(&addr, self.config.response_timeout)
            .await
            .map_err(ProvisionError::handshake)?;

        let request = NetworkMessage::JoinRequest {
            node_address: self.config.local_address.clone(),
        };
        let answer = client
            .request(request, |reply| match reply {
                NetworkMessage::JoinAccepted { network } => Some(Ok(network)),
                NetworkMessage::JoinRejected { reason } => Some(Err(reason)),
                _ => None,
            })
            .await
            .map_err(ProvisionError::handshake)?;

        let network = answer.map_err(|reason| {
            ProvisionError::Handshake(format!("join rejected by {}: {}", addr, reason))
        })?;

        tracing::info!(
            "Joined network as session {} ({} known peers)",
            network.session_id,
            network.known_peers.len()
        );
        *self.client.write() = Some(Arc::new(client));

        Ok(network)
    }

    async fn genesis_config(
        &self,
        network: &CommunicationNetwork,
    ) -> Result<GenesisConfig, ProvisionError> {
        let client = self.session().ok_or_else(|| {
            ProvisionError::Genesis("no handshake session, join the network first".to_string())
        })?;

        let request = NetworkMessage::GenesisRequest {
            session_id: network.session_id.clone(),
        };
        let genesis = client
            .request(request, |reply| match reply {
                NetworkMessage::GenesisResponse { genesis } => Some(genesis),
                _ => None,
            })
            .await
            .map_err(|e| ProvisionError::Genesis(e.to_string()))?;

        tracing::info!("Resolved genesis for network id {}", genesis.network_id);
        Ok(genesis)
    }
}
