//! Node Link - talking to the freshly launched chain node
//!
//! Handles everything that happens over the node's JSON-RPC endpoint:
//! - Connecting and identifying the node (client version, enode)
//! - Adding peers discovered on the communication network
//! - Watching account balances and chain statistics in the background

pub mod monitor;
pub mod rpc;
pub mod statistics;

pub use monitor::{MonitorConfig, NodeMonitor};
pub use rpc::{parse_quantity, parse_quantity_u64, RpcLinkConfig, RpcNodeLink};
pub use statistics::NetworkStatistics;
