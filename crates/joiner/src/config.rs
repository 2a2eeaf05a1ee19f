//! Joiner Configuration

use join_handshake::{HandshakeConfig, DEFAULT_HANDSHAKE_PORT, DEFAULT_RESPONSE_TIMEOUT_SECS};
use join_provisioner::{FlowSettings, SupervisorConfig, DEFAULT_STARTUP_TIMEOUT};
use join_types::{NodeDefaults, DEFAULT_IPC_PATH, DEFAULT_RPC_URL};
use node_link::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Joiner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinerConfig {
    /// Directory the node is provisioned into
    pub workspace_root: PathBuf,
    /// Directory holding the node start scripts
    pub scripts_dir: PathBuf,
    /// Address this node is reachable at
    pub local_address: String,
    /// Managing node handshake port
    pub handshake_port: u16,
    /// Handshake response timeout in seconds
    pub response_timeout_secs: u64,
    /// Node JSON-RPC endpoint
    pub rpc_url: String,
    /// Node IPC endpoint
    pub ipc_path: String,
    /// Seconds the node gets to signal startup
    pub startup_timeout_secs: u64,
    /// Balance check interval in seconds
    pub balance_interval_secs: u64,
    /// Statistics sample interval in seconds
    pub statistics_interval_secs: u64,
}

impl Default for JoinerConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            scripts_dir: PathBuf::from("."),
            local_address: "127.0.0.1".to_string(),
            handshake_port: DEFAULT_HANDSHAKE_PORT,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            ipc_path: DEFAULT_IPC_PATH.to_string(),
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT.as_secs(),
            balance_interval_secs: 10,
            statistics_interval_secs: 5,
        }
    }
}

impl JoinerConfig {
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            local_address: self.local_address.clone(),
            node_defaults: NodeDefaults {
                ipc_path: self.ipc_path.clone(),
                rpc_url: self.rpc_url.clone(),
            },
            workspace_root: self.workspace_root.clone(),
        }
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            scripts_dir: self.scripts_dir.clone(),
            working_dir: self.workspace_root.clone(),
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
        }
    }

    pub fn handshake(&self) -> HandshakeConfig {
        HandshakeConfig {
            local_address: self.local_address.clone(),
            port: self.handshake_port,
            response_timeout: Duration::from_secs(self.response_timeout_secs),
        }
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            balance_interval: Duration::from_secs(self.balance_interval_secs),
            statistics_interval: Duration::from_secs(self.statistics_interval_secs),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_network_defaults() {
        let config = JoinerConfig::default();
        let settings = config.flow_settings();

        assert_eq!(settings.node_defaults, NodeDefaults::default());
        assert_eq!(config.supervisor().startup_timeout, Duration::from_secs(100));
        assert_eq!(config.handshake().port, DEFAULT_HANDSHAKE_PORT);
    }

    #[test]
    fn test_node_runs_in_workspace_root() {
        let config = JoinerConfig {
            workspace_root: PathBuf::from("/srv/node"),
            scripts_dir: PathBuf::from("/opt/scripts"),
            ..Default::default()
        };

        let supervisor = config.supervisor();
        assert_eq!(supervisor.working_dir, PathBuf::from("/srv/node"));
        assert_eq!(supervisor.scripts_dir, PathBuf::from("/opt/scripts"));
        assert_eq!(config.flow_settings().workspace_root, PathBuf::from("/srv/node"));
    }
}
