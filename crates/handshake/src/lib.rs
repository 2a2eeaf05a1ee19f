//! Handshake - joining a consortium network through a managing node
//!
//! Architecture:
//! - A managing node runs `ManagingNodeServer` and hands out communication networks
//! - A joining node connects with `HandshakeClient`, joins, then asks for genesis
//! - Once the joining node's chain node is up, enodes are exchanged over the same session

pub mod client;
pub mod message;
pub mod network_join;
pub mod peers;
pub mod server;

pub use client::HandshakeClient;
pub use message::NetworkMessage;
pub use network_join::{HandshakeConfig, WsNetworkJoin};
pub use peers::EnodeExchange;
pub use server::{ManagingNodeServer, ServerStats};

/// Port managing nodes accept handshakes on
pub const DEFAULT_HANDSHAKE_PORT: u16 = 40000;

/// Seconds to wait for the managing node to answer a request
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;
