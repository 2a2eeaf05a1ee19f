//! The context record threaded through every provisioning stage

use crate::error::{InputError, ProvisionError};
use crate::network::{CommunicationNetwork, GenesisConfig, LinkInfo, NodeEndpoint};
use crate::role::{Address, Capability, Role};
use crate::{
    BLOCKCHAIN_FOLDER, DEFAULT_IPC_PATH, DEFAULT_RPC_URL, MESSAGING_FOLDER, MESSAGING_PORT,
};
use serde::{Deserialize, Serialize};

/// One key pair to generate (`<folder>/<file>.pub` and `<folder>/<file>.key`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub folder_name: String,
    pub file_name: String,
}

/// Secure-messaging node configuration template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingConfigSpec {
    pub config_name: String,
    pub folder_name: String,
    pub local_address: String,
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    pub public_key_file: String,
    pub private_key_file: String,
    pub public_arch_key_file: String,
    pub private_arch_key_file: String,
}

impl MessagingConfigSpec {
    /// Standard template: node + archival key pairs, port 9000 on both ends
    pub fn new(local_address: &str, remote_address: &str) -> Self {
        Self {
            config_name: "constellation.config".to_string(),
            folder_name: MESSAGING_FOLDER.to_string(),
            local_address: local_address.to_string(),
            local_port: MESSAGING_PORT,
            remote_address: remote_address.to_string(),
            remote_port: MESSAGING_PORT,
            public_key_file: "node.pub".to_string(),
            private_key_file: "node.key".to_string(),
            public_arch_key_file: "nodeArch.pub".to_string(),
            private_arch_key_file: "nodeArch.key".to_string(),
        }
    }
}

/// Endpoints the launched node exposes to downstream tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefaults {
    pub ipc_path: String,
    pub rpc_url: String,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            ipc_path: DEFAULT_IPC_PATH.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
        }
    }
}

/// Context record for one provisioning attempt
///
/// Created once per join, passed by value from stage to stage and enriched
/// along the way. Fields populated by a stage are write-once; reading one
/// before its producer ran is a `MissingField` error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinContext {
    pub role: Role,
    pub local_address: String,
    pub remote_address: String,
    pub min_block_interval: Option<u64>,
    pub max_block_interval: Option<u64>,
    pub maker_accounts: Option<Vec<Address>>,
    pub voter_accounts: Option<Vec<Address>>,
    pub workspace_folders: Vec<String>,
    pub key_material: Vec<KeySpec>,
    pub config_spec: MessagingConfigSpec,
    pub communication_network: CommunicationNetwork,
    pub node_defaults: NodeDefaults,
    pub genesis: Option<GenesisConfig>,
    pub node_endpoint: Option<NodeEndpoint>,
    pub node_link: Option<LinkInfo>,
}

impl JoinContext {
    /// Build the initial context from the operator's choices and the handshake result
    pub fn new(
        role: Role,
        local_address: &str,
        remote_address: &str,
        communication_network: CommunicationNetwork,
    ) -> Self {
        Self {
            role,
            local_address: local_address.to_string(),
            remote_address: remote_address.to_string(),
            min_block_interval: None,
            max_block_interval: None,
            maker_accounts: None,
            voter_accounts: None,
            workspace_folders: vec![BLOCKCHAIN_FOLDER.to_string(), MESSAGING_FOLDER.to_string()],
            key_material: vec![
                KeySpec {
                    folder_name: MESSAGING_FOLDER.to_string(),
                    file_name: "node".to_string(),
                },
                KeySpec {
                    folder_name: MESSAGING_FOLDER.to_string(),
                    file_name: "nodeArch".to_string(),
                },
            ],
            config_spec: MessagingConfigSpec::new(local_address, remote_address),
            communication_network,
            node_defaults: NodeDefaults::default(),
            genesis: None,
            node_endpoint: None,
            node_link: None,
        }
    }

    /// Override the node endpoint defaults
    pub fn with_node_defaults(mut self, defaults: NodeDefaults) -> Self {
        self.node_defaults = defaults;
        self
    }

    /// Record the block interval bounds
    pub fn set_block_interval(&mut self, min: u64, max: u64) -> Result<(), ProvisionError> {
        if self.min_block_interval.is_some() || self.max_block_interval.is_some() {
            return Err(ProvisionError::FieldAlreadySet("block_interval"));
        }
        if min > max {
            return Err(InputError::IntervalOrder { min, max }.into());
        }
        self.min_block_interval = Some(min);
        self.max_block_interval = Some(max);
        Ok(())
    }

    /// Block interval bounds as (min, max)
    pub fn block_interval(&self) -> Result<(u64, u64), ProvisionError> {
        match (self.min_block_interval, self.max_block_interval) {
            (Some(min), Some(max)) => Ok((min, max)),
            _ => Err(ProvisionError::MissingField("block_interval")),
        }
    }

    /// Record the accounts collected for a capability
    pub fn set_accounts(
        &mut self,
        capability: Capability,
        accounts: Vec<Address>,
    ) -> Result<(), ProvisionError> {
        let (slot, field) = self.accounts_slot(capability);
        if slot.is_some() {
            return Err(ProvisionError::FieldAlreadySet(field));
        }
        *slot = Some(accounts);
        Ok(())
    }

    /// Accounts collected for a capability
    pub fn accounts(&self, capability: Capability) -> Result<&[Address], ProvisionError> {
        let (accounts, field) = match capability {
            Capability::Maker => (&self.maker_accounts, "maker_accounts"),
            Capability::Voter => (&self.voter_accounts, "voter_accounts"),
        };
        accounts
            .as_deref()
            .ok_or(ProvisionError::MissingField(field))
    }

    /// First account collected for a capability
    pub fn primary_account(&self, capability: Capability) -> Result<&Address, ProvisionError> {
        self.accounts(capability)?
            .first()
            .ok_or(ProvisionError::Input(InputError::MissingAccount(capability)))
    }

    /// Every maker and voter account, without duplicates
    pub fn all_accounts(&self) -> Vec<Address> {
        let mut accounts: Vec<Address> = Vec::new();
        let collected = self.maker_accounts.iter().chain(self.voter_accounts.iter());
        for account in collected.flatten() {
            if !accounts.contains(account) {
                accounts.push(account.clone());
            }
        }
        accounts
    }

    pub fn set_genesis(&mut self, genesis: GenesisConfig) -> Result<(), ProvisionError> {
        set_once(&mut self.genesis, genesis, "genesis")
    }

    pub fn genesis(&self) -> Result<&GenesisConfig, ProvisionError> {
        self.genesis
            .as_ref()
            .ok_or(ProvisionError::MissingField("genesis"))
    }

    pub fn set_node_endpoint(&mut self, endpoint: NodeEndpoint) -> Result<(), ProvisionError> {
        set_once(&mut self.node_endpoint, endpoint, "node_endpoint")
    }

    pub fn node_endpoint(&self) -> Result<&NodeEndpoint, ProvisionError> {
        self.node_endpoint
            .as_ref()
            .ok_or(ProvisionError::MissingField("node_endpoint"))
    }

    pub fn set_node_link(&mut self, link: LinkInfo) -> Result<(), ProvisionError> {
        set_once(&mut self.node_link, link, "node_link")
    }

    pub fn node_link(&self) -> Result<&LinkInfo, ProvisionError> {
        self.node_link
            .as_ref()
            .ok_or(ProvisionError::MissingField("node_link"))
    }

    fn accounts_slot(&mut self, capability: Capability) -> (&mut Option<Vec<Address>>, &'static str) {
        match capability {
            Capability::Maker => (&mut self.maker_accounts, "maker_accounts"),
            Capability::Voter => (&mut self.voter_accounts, "voter_accounts"),
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<(), ProvisionError> {
    if slot.is_some() {
        return Err(ProvisionError::FieldAlreadySet(field));
    }
    *slot = Some(value);
    Ok(())
}

/// What a successful join hands back to its caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedNetworks {
    pub quorum_network: JoinContext,
    pub communication_network: CommunicationNetwork,
}
