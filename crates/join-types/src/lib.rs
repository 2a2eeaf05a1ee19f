//! Shared types for consortium node provisioning
//!
//! This crate holds everything the provisioning crates agree on:
//! - The context record threaded through the pipeline
//! - Node roles and blockchain addresses
//! - Handshake descriptors (communication network, genesis)
//! - The error taxonomy
//! - Collaborator traits (workspace, keys, prompts, network, node link, monitoring)

pub mod collaborators;
pub mod context;
pub mod error;
pub mod network;
pub mod prompt;
pub mod role;

pub use collaborators::{
    AccountGenerator, ConfigAssembler, KeyGenerator, ListenerPhase, Monitoring, NetworkJoin,
    NodeLink, PeerRegistry, Prompter, Workspace,
};
pub use context::{JoinContext, JoinedNetworks, KeySpec, MessagingConfigSpec, NodeDefaults};
pub use error::{InputError, ProvisionError};
pub use network::{CommunicationNetwork, GenesisConfig, LinkInfo, NodeEndpoint};
pub use prompt::{classify_address, AddressChoice, Prompt};
pub use role::{Address, Capability, Role};

/// Blockchain data folder (chain data, genesis, keystore)
pub const BLOCKCHAIN_FOLDER: &str = "Blockchain";

/// Secure-messaging folder (constellation keys and config)
pub const MESSAGING_FOLDER: &str = "Constellation";

/// Port the secure-messaging node listens on (local and remote)
pub const MESSAGING_PORT: u16 = 9000;

/// IPC endpoint exposed by the launched node
pub const DEFAULT_IPC_PATH: &str = "./Blockchain/geth.ipc";

/// JSON-RPC endpoint exposed by the launched node
pub const DEFAULT_RPC_URL: &str = "http://localhost:20010";

/// Prefix every literal blockchain address starts with
pub const ADDRESS_PREFIX: &str = "0x";
