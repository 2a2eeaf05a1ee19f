//! Join provisioner - turns a fresh machine into a node of an existing network
//!
//! This crate drives a join end to end:
//! - The fail-fast stage pipeline and its role-selected stages
//! - Node process supervision (start script, startup signal, detach)
//! - Local workspace, key material and messaging config collaborators
//! - The top-level flow from operator prompts to joined networks

pub mod configuration;
pub mod flow;
pub mod keys;
pub mod messaging_config;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod supervisor;
pub mod workspace;

#[cfg(test)]
mod tests;

pub use configuration::{resolve_address, CollectConfiguration, CollectionPlan};
pub use flow::{FlowSettings, JoinError, JoinFlow};
pub use keys::{LocalAccountGenerator, LocalKeyGenerator};
pub use messaging_config::MessagingConfigWriter;
pub use pipeline::{Collaborators, Pipeline, PipelineFailure};
pub use stage::Stage;
pub use supervisor::{
    startup_signal, LaunchSpec, LaunchedNode, NodeOutput, NodeScript, NodeSupervisor,
    SupervisorConfig, DEFAULT_STARTUP_TIMEOUT, NODE_STDERR_LOG, NODE_STDOUT_LOG,
};
pub use workspace::{LocalWorkspace, WorkspaceLock};
