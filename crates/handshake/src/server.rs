//! Handshake server (run by a managing node)
//!
//! Accepts joining nodes, hands each one a communication network, answers
//! genesis requests and relays enode traffic between members.

use crate::message::NetworkMessage;
use futures_util::{SinkExt, StreamExt};
use join_types::{CommunicationNetwork, GenesisConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Relayed message tagged with the connection it came from
type Relay = (u64, Vec<u8>);

/// Managing node's view of the network it hands out
struct NetworkState {
    topic: String,
    genesis: GenesisConfig,
    known_peers: Vec<String>,
    /// Joined members by session id
    members: HashMap<String, MemberInfo>,
}

#[derive(Debug, Clone)]
struct MemberInfo {
    node_address: String,
    connection: u64,
}

/// Stats about the handshake server
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub connections: usize,
    pub members: usize,
    pub messages_relayed: u64,
}

/// Handshake server
pub struct ManagingNodeServer {
    /// Channel relaying enode traffic to every connection
    relay: broadcast::Sender<Relay>,
    state: Arc<RwLock<NetworkState>>,
    stats: Arc<RwLock<ServerStats>>,
    next_connection: Arc<AtomicU64>,
}

impl ManagingNodeServer {
    /// Create a server handing out `topic` and `genesis`
    pub fn new(topic: &str, genesis: GenesisConfig) -> Self {
        let (relay, _) = broadcast::channel(1000);
        Self {
            relay,
            state: Arc::new(RwLock::new(NetworkState {
                topic: topic.to_string(),
                genesis,
                known_peers: Vec::new(),
                members: HashMap::new(),
            })),
            stats: Arc::new(RwLock::new(ServerStats::default())),
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start listening for joining nodes, returning the bound address
    pub async fn start(&self, addr: &str) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Handshake server listening on {}", local_addr);

        let relay = self.relay.clone();
        let state = self.state.clone();
        let stats = self.stats.clone();
        let next_connection = self.next_connection.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        tracing::info!("Node connected from {}", peer_addr);
                        let connection = next_connection.fetch_add(1, Ordering::SeqCst);
                        let relay = relay.clone();
                        let state = state.clone();
                        let stats = stats.clone();
                        let managing_node = local_addr.to_string();

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(
                                stream,
                                connection,
                                managing_node,
                                relay,
                                state,
                                stats,
                            )
                            .await
                            {
                                tracing::warn!("Handshake connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Get current stats
    pub fn stats(&self) -> ServerStats {
        let mut stats = self.stats.read().clone();
        stats.members = self.state.read().members.len();
        stats
    }

    /// Enodes announced so far
    pub fn known_peers(&self) -> Vec<String> {
        self.state.read().known_peers.clone()
    }

    /// Broadcast heartbeat to every connection
    pub fn broadcast_heartbeat(&self) {
        let _ = self.relay.send((0, NetworkMessage::Heartbeat.to_bytes()));
    }
}

async fn handle_connection(
    stream: TcpStream,
    connection: u64,
    managing_node: String,
    relay: broadcast::Sender<Relay>,
    state: Arc<RwLock<NetworkState>>,
    stats: Arc<RwLock<ServerStats>>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    stats.write().connections += 1;

    // Direct replies to this connection
    let (reply_tx, mut reply_rx) = mpsc::channel::<NetworkMessage>(100);
    let mut relay_rx = relay.subscribe();

    // Spawn task forwarding replies and relayed traffic to this node
    let send_task = tokio::spawn(async move {
        loop {
            let data = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(msg) => msg.to_bytes(),
                    None => break,
                },
                relayed = relay_rx.recv() => match relayed {
                    Ok((origin, _)) if origin == connection => continue,
                    Ok((_, data)) => data,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Connection {} lagged {} relayed messages", connection, n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages from the node
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                let network_msg = match NetworkMessage::from_bytes(&data) {
                    Ok(network_msg) => network_msg,
                    Err(e) => {
                        tracing::warn!("Undecodable message on connection {}: {}", connection, e);
                        continue;
                    }
                };

                if network_msg.is_relayed() {
                    if let NetworkMessage::EnodeAnnouncement { ref enode } = network_msg {
                        let mut state = state.write();
                        if !state.known_peers.contains(enode) {
                            state.known_peers.push(enode.clone());
                        }
                    }
                    if relay.send((connection, data)).is_ok() {
                        stats.write().messages_relayed += 1;
                    }
                    continue;
                }

                let reply = match network_msg {
                    NetworkMessage::JoinRequest { node_address } => {
                        join_member(&state, &managing_node, connection, node_address)
                    }
                    NetworkMessage::GenesisRequest { session_id } => {
                        let state = state.read();
                        if state.members.contains_key(&session_id) {
                            Some(NetworkMessage::GenesisResponse {
                                genesis: state.genesis.clone(),
                            })
                        } else {
                            tracing::warn!("Genesis request for unknown session {}", session_id);
                            None
                        }
                    }
                    _ => None,
                };

                if let Some(reply) = reply {
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Cleanup
    send_task.abort();
    state.write().members.retain(|session_id, member| {
        if member.connection != connection {
            return true;
        }
        tracing::info!("Node {} left (session {})", member.node_address, session_id);
        false
    });
    stats.write().connections -= 1;
    tracing::info!("Connection {} closed", connection);

    Ok(())
}

fn join_member(
    state: &RwLock<NetworkState>,
    managing_node: &str,
    connection: u64,
    node_address: String,
) -> Option<NetworkMessage> {
    if node_address.trim().is_empty() {
        return Some(NetworkMessage::JoinRejected {
            reason: "node address is empty".to_string(),
        });
    }

    let mut state = state.write();
    let session_id = format!("{}-{}", node_address, connection);
    state.members.insert(
        session_id.clone(),
        MemberInfo {
            node_address: node_address.clone(),
            connection,
        },
    );
    tracing::info!(
        "Node {} joined as session {} ({} members)",
        node_address,
        session_id,
        state.members.len()
    );

    Some(NetworkMessage::JoinAccepted {
        network: CommunicationNetwork {
            managing_node: managing_node.to_string(),
            session_id,
            topic: state.topic.clone(),
            known_peers: state.known_peers.clone(),
        },
    })
}
