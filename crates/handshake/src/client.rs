//! Handshake client (run by the joining node)

use crate::message::NetworkMessage;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Session with a managing node
///
/// Every inbound message is fanned out to all subscribers, so request/response
/// round-trips and long-lived enode listeners can share one connection.
/// The receiver task holds the only sender, so subscribers see `Closed` once
/// the managing node goes away.
pub struct HandshakeClient {
    /// Channel to send messages to the managing node
    msg_tx: mpsc::Sender<NetworkMessage>,
    /// Subscription handle, never read itself
    inbound: broadcast::Receiver<NetworkMessage>,
    /// Upper bound on request/response round-trips
    response_timeout: Duration,
}

impl HandshakeClient {
    /// Connect to a managing node's handshake server
    pub async fn connect(addr: &str, response_timeout: Duration) -> anyhow::Result<Self> {
        let url = format!("ws://{}", addr);
        let (ws_stream, _) = tokio::time::timeout(response_timeout, connect_async(&url))
            .await
            .map_err(|_| anyhow::anyhow!("timed out connecting to {}", url))??;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        tracing::info!("Connected to managing node at {}", addr);

        let (inbound_tx, inbound) = broadcast::channel::<NetworkMessage>(256);
        let (msg_tx, mut msg_rx) = mpsc::channel::<NetworkMessage>(100);

        // Spawn receiver task
        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Binary(data)) => match NetworkMessage::from_bytes(&data) {
                        Ok(NetworkMessage::Heartbeat) => {
                            tracing::trace!("Heartbeat from managing node");
                        }
                        Ok(network_msg) => {
                            // No subscribers is fine
                            let _ = inbound_tx.send(network_msg);
                        }
                        Err(e) => {
                            tracing::warn!("Undecodable message from managing node: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        tracing::warn!("Managing node closed connection");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        // Spawn sender task
        tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let data = msg.to_bytes();
                if ws_sender.send(Message::Binary(data)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            msg_tx,
            inbound,
            response_timeout,
        })
    }

    /// Send a message to the managing node
    pub async fn send(&self, msg: NetworkMessage) -> anyhow::Result<()> {
        self.msg_tx
            .send(msg)
            .await
            .map_err(|_| anyhow::anyhow!("handshake session closed"))
    }

    /// Subscribe to every message the managing node sends from now on
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkMessage> {
        self.inbound.resubscribe()
    }

    /// Send a request and wait for the first message `extract` accepts
    pub async fn request<T, F>(&self, msg: NetworkMessage, extract: F) -> anyhow::Result<T>
    where
        F: Fn(NetworkMessage) -> Option<T>,
    {
        // Subscribe before sending so the answer cannot slip past
        let mut rx = self.subscribe();
        self.send(msg).await?;

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(reply) => {
                        if let Some(value) = extract(reply) {
                            return Ok(value);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Handshake request lagged {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(anyhow::anyhow!("handshake session closed"));
                    }
                }
            }
        };

        tokio::time::timeout(self.response_timeout, wait)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "no answer from managing node within {:?}",
                    self.response_timeout
                )
            })?
    }
}
