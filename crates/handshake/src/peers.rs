//! Enode exchange - peer discovery over the handshake session

use crate::client::HandshakeClient;
use crate::message::NetworkMessage;
use crate::network_join::WsNetworkJoin;
use async_trait::async_trait;
use dashmap::DashMap;
use join_types::{
    CommunicationNetwork, LinkInfo, ListenerPhase, NodeLink, PeerRegistry, ProvisionError,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Background tasks registered on the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Listener {
    Enodes,
    EnodeRequests,
    EnodeResponses,
}

/// Adds peers announced on the communication network to the local node
/// and answers other members' enode requests
pub struct EnodeExchange {
    join: Arc<WsNetworkJoin>,
    node: Arc<dyn NodeLink>,
    listeners: DashMap<Listener, JoinHandle<()>>,
}

impl EnodeExchange {
    pub fn new(join: Arc<WsNetworkJoin>, node: Arc<dyn NodeLink>) -> Self {
        Self {
            join,
            node,
            listeners: DashMap::new(),
        }
    }

    /// Number of listener tasks currently armed
    pub fn armed_listeners(&self) -> usize {
        self.listeners
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }

    fn session(&self) -> Result<Arc<HandshakeClient>, ProvisionError> {
        self.join.session().ok_or_else(|| {
            ProvisionError::ListenerRegistration(
                "no handshake session, join the network first".to_string(),
            )
        })
    }

    /// Install a listener task, aborting whatever was armed under the same key
    fn arm(&self, listener: Listener, task: JoinHandle<()>) {
        if let Some(previous) = self.listeners.insert(listener, task) {
            previous.abort();
            tracing::debug!("Re-armed {:?} listener", listener);
        }
    }
}

impl Drop for EnodeExchange {
    fn drop(&mut self) {
        for entry in self.listeners.iter() {
            entry.value().abort();
        }
    }
}

#[async_trait]
impl PeerRegistry for EnodeExchange {
    async fn listen_for_enodes(
        &self,
        phase: ListenerPhase,
        network: &CommunicationNetwork,
    ) -> Result<(), ProvisionError> {
        let session = self.session()?;
        let rx = session.subscribe();

        // Peers the managing node already knew about when we joined
        if phase == ListenerPhase::PreHandshake {
            for enode in &network.known_peers {
                add_peer(self.node.as_ref(), enode).await;
            }
        }

        let node = self.node.clone();
        let task = tokio::spawn(forward_messages(rx, "enode listener", move |msg| {
            let node = node.clone();
            async move {
                if let NetworkMessage::EnodeAnnouncement { enode } = msg {
                    add_peer(node.as_ref(), &enode).await;
                }
            }
        }));
        self.arm(Listener::Enodes, task);

        tracing::info!("Listening for new enodes on {} ({:?})", network.topic, phase);
        Ok(())
    }

    async fn add_enode_request_handler(
        &self,
        network: &CommunicationNetwork,
        link: &LinkInfo,
    ) -> Result<(), ProvisionError> {
        let session = self.session()?;
        let rx = session.subscribe();

        let enode = link.enode.clone();
        let responder = session.clone();
        let task = tokio::spawn(forward_messages(rx, "enode request handler", move |msg| {
            let enode = enode.clone();
            let responder = responder.clone();
            async move {
                if let NetworkMessage::EnodeRequest { requester } = msg {
                    tracing::debug!("Answering enode request from {}", requester);
                    if let Err(e) = responder.send(NetworkMessage::EnodeResponse { enode }).await {
                        tracing::warn!("Failed to answer enode request: {}", e);
                    }
                }
            }
        }));
        self.arm(Listener::EnodeRequests, task);

        // Let current members dial us without asking
        session
            .send(NetworkMessage::EnodeAnnouncement {
                enode: link.enode.clone(),
            })
            .await
            .map_err(|e| ProvisionError::ListenerRegistration(e.to_string()))?;

        tracing::info!("Enode request handler registered on {}", network.topic);
        Ok(())
    }

    async fn add_enode_response_handler(
        &self,
        network: &CommunicationNetwork,
    ) -> Result<(), ProvisionError> {
        let session = self.session()?;
        let rx = session.subscribe();

        let node = self.node.clone();
        let task = tokio::spawn(forward_messages(rx, "enode response handler", move |msg| {
            let node = node.clone();
            async move {
                if let NetworkMessage::EnodeResponse { enode } = msg {
                    add_peer(node.as_ref(), &enode).await;
                }
            }
        }));
        self.arm(Listener::EnodeResponses, task);

        // Ask every member for its enode now that we can take the answers
        session
            .send(NetworkMessage::EnodeRequest {
                requester: network.session_id.clone(),
            })
            .await
            .map_err(|e| ProvisionError::ListenerRegistration(e.to_string()))?;

        tracing::info!("Enode response handler registered on {}", network.topic);
        Ok(())
    }
}

async fn add_peer(node: &dyn NodeLink, enode: &str) {
    match node.add_peer(enode).await {
        Ok(true) => tracing::info!("Added peer {}", enode),
        Ok(false) => tracing::debug!("Node declined peer {}", enode),
        Err(e) => tracing::warn!("Failed to add peer {}: {}", enode, e),
    }
}

/// Feed every session message to `handle` until the session closes
async fn forward_messages<F, Fut>(
    mut rx: broadcast::Receiver<NetworkMessage>,
    name: &'static str,
    handle: F,
) where
    F: Fn(NetworkMessage) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        match rx.recv().await {
            Ok(msg) => handle(msg).await,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("{} lagged {} messages", name, n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("{} stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HandshakeClient;
    use crate::network_join::HandshakeConfig;
    use crate::server::ManagingNodeServer;
    use join_types::{Address, GenesisConfig, NetworkJoin, NodeEndpoint};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingNode {
        peers: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NodeLink for RecordingNode {
        async fn connect(&self, _endpoint: &NodeEndpoint) -> Result<LinkInfo, ProvisionError> {
            unreachable!("not used by the exchange")
        }

        async fn add_peer(&self, enode: &str) -> Result<bool, ProvisionError> {
            self.peers.lock().push(enode.to_string());
            Ok(true)
        }

        async fn balance(&self, _account: &Address) -> Result<u128, ProvisionError> {
            Ok(0)
        }

        async fn block_number(&self) -> Result<u64, ProvisionError> {
            Ok(0)
        }

        async fn peer_count(&self) -> Result<u64, ProvisionError> {
            Ok(0)
        }
    }

    async fn joined() -> (ManagingNodeServer, String, Arc<WsNetworkJoin>, CommunicationNetwork) {
        let server = ManagingNodeServer::new(
            "enodes",
            GenesisConfig {
                network_id: 7,
                genesis_json: "{}".to_string(),
            },
        );
        let addr = server.start("127.0.0.1:0").await.unwrap().to_string();

        let join = Arc::new(WsNetworkJoin::new(HandshakeConfig {
            local_address: "10.0.0.2".to_string(),
            response_timeout: Duration::from_secs(5),
            ..Default::default()
        }));
        let network = join.join_network(&addr).await.unwrap();
        (server, addr, join, network)
    }

    async fn wait_for_peers(node: &RecordingNode, count: usize) {
        for _ in 0..100 {
            if node.peers.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {} peers, got {:?}", count, node.peers.lock());
    }

    #[tokio::test]
    async fn test_requires_session() {
        let join = Arc::new(WsNetworkJoin::new(HandshakeConfig::default()));
        let exchange = EnodeExchange::new(join, Arc::new(RecordingNode::default()));
        let network = CommunicationNetwork {
            managing_node: "x".to_string(),
            session_id: "s".to_string(),
            topic: "t".to_string(),
            known_peers: vec![],
        };

        let err = exchange
            .listen_for_enodes(ListenerPhase::PreHandshake, &network)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ListenerRegistration(_)));
    }

    #[tokio::test]
    async fn test_second_phase_rearms_listener() {
        let (_server, addr, join, network) = joined().await;
        let node = Arc::new(RecordingNode::default());
        let exchange = EnodeExchange::new(join, node.clone());

        exchange
            .listen_for_enodes(ListenerPhase::PreHandshake, &network)
            .await
            .unwrap();
        exchange
            .listen_for_enodes(ListenerPhase::PostHandshake, &network)
            .await
            .unwrap();
        assert_eq!(exchange.armed_listeners(), 1);

        // Another member announces itself
        let other = HandshakeClient::connect(&addr, Duration::from_secs(5))
            .await
            .unwrap();
        other
            .send(NetworkMessage::EnodeAnnouncement {
                enode: "enode://other@10.0.0.3:30303".to_string(),
            })
            .await
            .unwrap();

        wait_for_peers(&node, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            *node.peers.lock(),
            vec!["enode://other@10.0.0.3:30303".to_string()]
        );
    }

    #[tokio::test]
    async fn test_request_handler_answers_with_own_enode() {
        let (_server, addr, join, network) = joined().await;
        let exchange = EnodeExchange::new(join, Arc::new(RecordingNode::default()));
        let link = LinkInfo {
            client_version: "Geth/v1".to_string(),
            enode: "enode://me@10.0.0.2:30303".to_string(),
        };

        exchange
            .add_enode_request_handler(&network, &link)
            .await
            .unwrap();

        let other = HandshakeClient::connect(&addr, Duration::from_secs(5))
            .await
            .unwrap();
        let enode = other
            .request(
                NetworkMessage::EnodeRequest {
                    requester: "other".to_string(),
                },
                |reply| match reply {
                    NetworkMessage::EnodeResponse { enode } => Some(enode),
                    _ => None,
                },
            )
            .await
            .unwrap();

        assert_eq!(enode, "enode://me@10.0.0.2:30303");
    }

    #[tokio::test]
    async fn test_response_handler_adds_answering_members() {
        let (_server, addr, join, network) = joined().await;

        // An existing member that answers enode requests
        let other = HandshakeClient::connect(&addr, Duration::from_secs(5))
            .await
            .unwrap();
        let mut other_rx = other.subscribe();
        tokio::spawn(async move {
            while let Ok(msg) = other_rx.recv().await {
                if let NetworkMessage::EnodeRequest { .. } = msg {
                    other
                        .send(NetworkMessage::EnodeResponse {
                            enode: "enode://other@10.0.0.3:30303".to_string(),
                        })
                        .await
                        .unwrap();
                }
            }
        });
        // Let the server subscribe the new connection to relayed traffic
        tokio::time::sleep(Duration::from_millis(100)).await;

        let node = Arc::new(RecordingNode::default());
        let exchange = EnodeExchange::new(join, node.clone());
        exchange.add_enode_response_handler(&network).await.unwrap();

        wait_for_peers(&node, 1).await;
        assert_eq!(node.peers.lock()[0], "enode://other@10.0.0.3:30303");
    }
}
