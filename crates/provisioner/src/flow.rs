//! Top-level join flow
//!
//! Remote address and role come from the operator, the handshake yields the
//! communication network, and the role's pipeline does the rest.

use crate::pipeline::{Collaborators, Pipeline, PipelineFailure};
use crate::workspace::WorkspaceLock;
use join_types::{
    InputError, JoinContext, JoinedNetworks, NodeDefaults, Prompt, ProvisionError, Role,
};
use std::path::PathBuf;
use thiserror::Error;

/// Local settings the flow needs besides its collaborators
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Address this node is reachable at
    pub local_address: String,
    pub node_defaults: NodeDefaults,
    /// Directory the workspace folders and lock live in
    pub workspace_root: PathBuf,
}

/// Why a join did not complete
#[derive(Debug, Error)]
pub enum JoinError {
    /// Failed before the pipeline was built
    #[error("join setup failed: {0}")]
    Setup(ProvisionError),

    #[error(transparent)]
    Pipeline(#[from] PipelineFailure),
}

impl JoinError {
    pub fn error(&self) -> &ProvisionError {
        match self {
            JoinError::Setup(error) => error,
            JoinError::Pipeline(failure) => &failure.error,
        }
    }

    /// Last-known context, when the pipeline got that far
    pub fn context(&self) -> Option<&JoinContext> {
        match self {
            JoinError::Setup(_) => None,
            JoinError::Pipeline(failure) => Some(&failure.context),
        }
    }
}

impl From<ProvisionError> for JoinError {
    fn from(error: ProvisionError) -> Self {
        JoinError::Setup(error)
    }
}

impl From<InputError> for JoinError {
    fn from(error: InputError) -> Self {
        JoinError::Setup(error.into())
    }
}

pub struct JoinFlow {
    collaborators: Collaborators,
    settings: FlowSettings,
}

impl JoinFlow {
    pub fn new(collaborators: Collaborators, settings: FlowSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// Join an existing network
    pub async fn run(&self) -> Result<JoinedNetworks, JoinError> {
        let result = self.join().await;
        if let Err(e) = &result {
            tracing::error!("ERROR {}", e);
        }
        result
    }

    async fn join(&self) -> Result<JoinedNetworks, JoinError> {
        let prompter = &self.collaborators.prompter;

        prompter.inform(
            "In order to join an existing network, please enter the ip address of one of the managing nodes",
        );
        let remote_address = prompter.ask(Prompt::RemoteAddress).await?.trim().to_string();
        if remote_address.is_empty() {
            return Err(JoinError::Setup(ProvisionError::Handshake(
                "no managing node address given".to_string(),
            )));
        }

        prompter.inform("Please select an option:");
        for role in Role::ALL {
            prompter.inform(&format!("{}) {}", role.option(), role.description()));
        }
        let role: Role = prompter.ask(Prompt::Role).await?.parse()?;

        let _lock = WorkspaceLock::acquire(&self.settings.workspace_root).await?;

        tracing::info!("Joining {} as {}", remote_address, role);
        let network = self
            .collaborators
            .network
            .join_network(&remote_address)
            .await?;

        let initial = JoinContext::new(
            role,
            &self.settings.local_address,
            &remote_address,
            network.clone(),
        )
        .with_node_defaults(self.settings.node_defaults.clone());

        let pipeline = Pipeline::for_role(role, &self.collaborators);
        let quorum_network = pipeline.run(initial).await?;

        tracing::info!("Joined network via {} as {}", remote_address, role);
        Ok(JoinedNetworks {
            quorum_network,
            communication_network: network,
        })
    }
}
