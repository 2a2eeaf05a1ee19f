//! Background monitors - account balances and chain statistics
//!
//! Both monitors take one sample while being set up, so an unreachable node
//! fails the stage, then keep sampling on a spawned task that nobody awaits.

use crate::statistics::NetworkStatistics;
use async_trait::async_trait;
use join_types::{Address, Monitoring, NodeEndpoint, NodeLink, ProvisionError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Monitor settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub balance_interval: Duration,
    pub statistics_interval: Duration,
    /// Balances below this (in wei) are reported as too low to transact
    pub low_balance_threshold: u128,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            balance_interval: Duration::from_secs(10),
            statistics_interval: Duration::from_secs(5),
            low_balance_threshold: 1_000_000_000_000_000, // 0.001 ether
        }
    }
}

/// Runs the balance and statistics monitors against the node
pub struct NodeMonitor {
    node: Arc<dyn NodeLink>,
    config: MonitorConfig,
    balances: Arc<RwLock<HashMap<Address, u128>>>,
    statistics: Arc<RwLock<NetworkStatistics>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NodeMonitor {
    pub fn new(node: Arc<dyn NodeLink>, config: MonitorConfig) -> Self {
        Self {
            node,
            config,
            balances: Arc::new(RwLock::new(HashMap::new())),
            statistics: Arc::new(RwLock::new(NetworkStatistics::default())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Last known balance of each monitored account
    pub fn balances(&self) -> HashMap<Address, u128> {
        self.balances.read().clone()
    }

    /// Current chain statistics
    pub fn statistics(&self) -> NetworkStatistics {
        self.statistics.read().clone()
    }

    /// Stop every background monitor
    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for NodeMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl Monitoring for NodeMonitor {
    async fn monitor_balances(&self, accounts: &[Address]) -> Result<(), ProvisionError> {
        if accounts.is_empty() {
            tracing::info!("No maker or voter accounts to monitor");
            return Ok(());
        }

        for account in accounts {
            let balance = self
                .node
                .balance(account)
                .await
                .map_err(|e| ProvisionError::MonitoringSetup(e.to_string()))?;
            report_balance(account, None, balance, self.config.low_balance_threshold);
            self.balances.write().insert(account.clone(), balance);
        }

        let count = accounts.len();
        let node = self.node.clone();
        let balances = self.balances.clone();
        let accounts = accounts.to_vec();
        let period = self.config.balance_interval;
        let threshold = self.config.low_balance_threshold;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                interval.tick().await;
                for account in &accounts {
                    match node.balance(account).await {
                        Ok(balance) => {
                            let previous = balances.write().insert(account.clone(), balance);
                            report_balance(account, previous, balance, threshold);
                        }
                        Err(e) => tracing::warn!("Balance check for {} failed: {}", account, e),
                    }
                }
            }
        });
        self.tasks.lock().push(task);

        tracing::info!("Monitoring balances of {} accounts", count);
        Ok(())
    }

    async fn collect_statistics(&self, endpoint: &NodeEndpoint) -> Result<(), ProvisionError> {
        let (block_number, peer_count) = sample(self.node.as_ref())
            .await
            .map_err(|e| ProvisionError::MonitoringSetup(e.to_string()))?;
        self.statistics.write().record(block_number, peer_count);

        let node = self.node.clone();
        let statistics = self.statistics.clone();
        let period = self.config.statistics_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                interval.tick().await;
                match sample(node.as_ref()).await {
                    Ok((block_number, peer_count)) => {
                        let mut stats = statistics.write();
                        stats.record(block_number, peer_count);
                        if stats.samples % 12 == 0 {
                            tracing::info!(
                                "Block {}: {} peers, {} blocks observed",
                                stats.block_number,
                                stats.peer_count,
                                stats.blocks_observed
                            );
                        }
                    }
                    Err(e) => {
                        statistics.write().record_failure();
                        tracing::warn!("Statistics sample failed: {}", e);
                    }
                }
            }
        });
        self.tasks.lock().push(task);

        tracing::info!(
            "Collecting statistics from {} (block {}, {} peers)",
            endpoint.rpc_url,
            block_number,
            peer_count
        );
        Ok(())
    }
}

async fn sample(node: &dyn NodeLink) -> Result<(u64, u64), ProvisionError> {
    let block_number = node.block_number().await?;
    let peer_count = node.peer_count().await?;
    Ok((block_number, peer_count))
}

fn report_balance(account: &Address, previous: Option<u128>, balance: u128, threshold: u128) {
    if previous == Some(balance) {
        return;
    }
    if balance < threshold {
        tracing::warn!("Account {} balance {} wei is too low to transact", account, balance);
    } else {
        tracing::info!("Account {} balance: {} wei", account, balance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use join_types::LinkInfo;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Node whose block number advances on every call
    #[derive(Default)]
    struct ScriptedNode {
        blocks: AtomicU64,
        unreachable: bool,
    }

    #[async_trait]
    impl NodeLink for ScriptedNode {
        async fn connect(&self, _endpoint: &NodeEndpoint) -> Result<LinkInfo, ProvisionError> {
            unreachable!("monitors never connect")
        }

        async fn add_peer(&self, _enode: &str) -> Result<bool, ProvisionError> {
            Ok(true)
        }

        async fn balance(&self, account: &Address) -> Result<u128, ProvisionError> {
            if self.unreachable {
                return Err(ProvisionError::NodeLink("connection refused".to_string()));
            }
            Ok(account.as_str().len() as u128)
        }

        async fn block_number(&self) -> Result<u64, ProvisionError> {
            if self.unreachable {
                return Err(ProvisionError::NodeLink("connection refused".to_string()));
            }
            Ok(self.blocks.fetch_add(1, Ordering::SeqCst))
        }

        async fn peer_count(&self) -> Result<u64, ProvisionError> {
            Ok(4)
        }
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            balance_interval: Duration::from_millis(20),
            statistics_interval: Duration::from_millis(20),
            low_balance_threshold: 1,
        }
    }

    fn endpoint() -> NodeEndpoint {
        NodeEndpoint {
            ipc_path: "./Blockchain/geth.ipc".to_string(),
            rpc_url: "http://localhost:20010".to_string(),
            pid: None,
        }
    }

    #[tokio::test]
    async fn test_balances_sampled_during_setup() {
        let monitor = NodeMonitor::new(Arc::new(ScriptedNode::default()), fast_config());
        let maker = Address::parse("0xaaaa").unwrap();

        monitor.monitor_balances(&[maker.clone()]).await.unwrap();

        assert_eq!(monitor.balances().get(&maker), Some(&6));
    }

    #[tokio::test]
    async fn test_no_accounts_is_fine() {
        let monitor = NodeMonitor::new(Arc::new(ScriptedNode::default()), fast_config());
        monitor.monitor_balances(&[]).await.unwrap();
        assert!(monitor.balances().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_node_fails_setup() {
        let node = ScriptedNode {
            unreachable: true,
            ..Default::default()
        };
        let monitor = NodeMonitor::new(Arc::new(node), fast_config());

        let err = monitor
            .monitor_balances(&[Address::parse("0xaaaa").unwrap()])
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::MonitoringSetup(_)));

        let err = monitor.collect_statistics(&endpoint()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MonitoringSetup(_)));
    }

    #[tokio::test]
    async fn test_statistics_keep_sampling_in_background() {
        let monitor = NodeMonitor::new(Arc::new(ScriptedNode::default()), fast_config());

        monitor.collect_statistics(&endpoint()).await.unwrap();
        assert_eq!(monitor.statistics().samples, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let stats = monitor.statistics();
        assert!(stats.samples > 1);
        assert!(stats.blocks_observed > 0);
        assert_eq!(stats.peer_count, 4);

        monitor.stop();
    }
}
