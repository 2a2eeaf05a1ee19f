//! JSON-RPC link to the launched node

use async_trait::async_trait;
use join_types::{Address, LinkInfo, NodeEndpoint, NodeLink, ProvisionError};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Link settings
#[derive(Debug, Clone)]
pub struct RpcLinkConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Connection attempts while the node's RPC endpoint comes up
    pub connect_attempts: u32,
    /// Delay between connection attempts
    pub retry_delay: Duration,
}

impl Default for RpcLinkConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_attempts: 10,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Talks to the node over its HTTP JSON-RPC endpoint
pub struct RpcNodeLink {
    config: RpcLinkConfig,
    /// Client for the connected node
    client: RwLock<Option<HttpClient>>,
}

impl RpcNodeLink {
    pub fn new(config: RpcLinkConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    /// Whether `connect` has succeeded
    pub fn is_connected(&self) -> bool {
        self.client.read().is_some()
    }

    fn connected(&self) -> Result<HttpClient, ProvisionError> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| ProvisionError::NodeLink("not connected to the node".to_string()))
    }

    async fn call<R: DeserializeOwned>(
        client: &HttpClient,
        method: &str,
        params: ArrayParams,
    ) -> Result<R, ProvisionError> {
        client
            .request(method, params)
            .await
            .map_err(|e| ProvisionError::NodeLink(format!("{}: {}", method, e)))
    }

    async fn identify(client: &HttpClient) -> Result<LinkInfo, ProvisionError> {
        let client_version: String = Self::call(client, "web3_clientVersion", rpc_params![]).await?;
        let node_info: serde_json::Value = Self::call(client, "admin_nodeInfo", rpc_params![]).await?;
        let enode = node_info
            .get("enode")
            .and_then(|enode| enode.as_str())
            .ok_or_else(|| ProvisionError::NodeLink("admin_nodeInfo has no enode".to_string()))?
            .to_string();

        Ok(LinkInfo {
            client_version,
            enode,
        })
    }
}

#[async_trait]
impl NodeLink for RpcNodeLink {
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<LinkInfo, ProvisionError> {
        let client = HttpClientBuilder::default()
            .request_timeout(self.config.request_timeout)
            .build(&endpoint.rpc_url)
            .map_err(ProvisionError::node_link)?;

        let attempts = self.config.connect_attempts.max(1);
        let mut attempt = 1;
        let info = loop {
            match Self::identify(&client).await {
                Ok(info) => break info,
                Err(e) if attempt < attempts => {
                    tracing::debug!(
                        "Node at {} not ready (attempt {}/{}): {}",
                        endpoint.rpc_url,
                        attempt,
                        attempts,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!("Linked to {} at {}", info.client_version, endpoint.rpc_url);
        *self.client.write() = Some(client);
        Ok(info)
    }

    async fn add_peer(&self, enode: &str) -> Result<bool, ProvisionError> {
        let client = self.connected()?;
        Self::call(&client, "admin_addPeer", rpc_params![enode]).await
    }

    async fn balance(&self, account: &Address) -> Result<u128, ProvisionError> {
        let client = self.connected()?;
        let quantity: String =
            Self::call(&client, "eth_getBalance", rpc_params![account.as_str(), "latest"]).await?;
        parse_quantity(&quantity)
    }

    async fn block_number(&self) -> Result<u64, ProvisionError> {
        let client = self.connected()?;
        let quantity: String = Self::call(&client, "eth_blockNumber", rpc_params![]).await?;
        parse_quantity_u64(&quantity)
    }

    async fn peer_count(&self) -> Result<u64, ProvisionError> {
        let client = self.connected()?;
        let quantity: String = Self::call(&client, "net_peerCount", rpc_params![]).await?;
        parse_quantity_u64(&quantity)
    }
}

/// Parse a `0x`-prefixed hex quantity as returned by the node
pub fn parse_quantity(quantity: &str) -> Result<u128, ProvisionError> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| ProvisionError::NodeLink(format!("not a hex quantity: {}", quantity)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ProvisionError::NodeLink(format!("bad quantity {}: {}", quantity, e)))
}

/// Parse a hex quantity that must fit a `u64` (block numbers, peer counts)
pub fn parse_quantity_u64(quantity: &str) -> Result<u64, ProvisionError> {
    let value = parse_quantity(quantity)?;
    u64::try_from(value)
        .map_err(|_| ProvisionError::NodeLink(format!("quantity {} out of range", quantity)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(
            parse_quantity("0xde0b6b3a7640000").unwrap(),
            1_000_000_000_000_000_000
        );
    }

    #[test]
    fn test_parse_quantity_rejects_decimal() {
        assert!(parse_quantity("436").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_quantity_u64_rejects_overflow() {
        assert_eq!(parse_quantity_u64("0x1b4").unwrap(), 436);
        assert_eq!(parse_quantity_u64("0xffffffffffffffff").unwrap(), u64::MAX);

        let err = parse_quantity_u64("0x10000000000000000").unwrap_err();
        assert!(matches!(err, ProvisionError::NodeLink(ref msg) if msg.contains("out of range")));
    }

    #[tokio::test]
    async fn test_calls_require_connection() {
        let link = RpcNodeLink::new(RpcLinkConfig::default());
        assert!(!link.is_connected());

        let err = link.block_number().await.unwrap_err();
        assert!(matches!(err, ProvisionError::NodeLink(_)));
    }

    #[tokio::test]
    async fn test_connect_gives_up_on_dead_endpoint() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let link = RpcNodeLink::new(RpcLinkConfig {
            request_timeout: Duration::from_millis(500),
            connect_attempts: 2,
            retry_delay: Duration::from_millis(10),
        });
        let endpoint = NodeEndpoint {
            ipc_path: "./Blockchain/geth.ipc".to_string(),
            rpc_url: format!("http://127.0.0.1:{}", port),
            pid: None,
        };

        let err = link.connect(&endpoint).await.unwrap_err();
        assert!(matches!(err, ProvisionError::NodeLink(_)));
        assert!(!link.is_connected());
    }
}
