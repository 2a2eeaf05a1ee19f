//! Pipeline orchestrator
//!
//! Runs a fixed list of stages over one context, feeding each stage the
//! previous stage's output and stopping at the first failure. Nothing that
//! already happened (folders, keys, a running node) is rolled back.

use crate::configuration::{CollectConfiguration, CollectionPlan};
use crate::stage::Stage;
use crate::stages::{
    AssembleConfig, ClearWorkspace, CollectStatistics, CreateWorkspace, EnodeRequestHandler,
    EnodeResponseHandler, GenerateKeys, LaunchNode, LinkNode, ListenForEnodes, MonitorBalances,
    ResolveGenesis,
};
use crate::supervisor::{NodeScript, NodeSupervisor};
use join_types::{
    AccountGenerator, ConfigAssembler, JoinContext, KeyGenerator, ListenerPhase, Monitoring,
    NetworkJoin, NodeLink, PeerRegistry, Prompter, ProvisionError, Role, Workspace,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Everything the stages need from the outside world
#[derive(Clone)]
pub struct Collaborators {
    pub workspace: Arc<dyn Workspace>,
    pub keys: Arc<dyn KeyGenerator>,
    pub accounts: Arc<dyn AccountGenerator>,
    pub config: Arc<dyn ConfigAssembler>,
    pub prompter: Arc<dyn Prompter>,
    pub network: Arc<dyn NetworkJoin>,
    pub supervisor: Arc<NodeSupervisor>,
    pub node: Arc<dyn NodeLink>,
    pub peers: Arc<dyn PeerRegistry>,
    pub monitoring: Arc<dyn Monitoring>,
}

/// A stage failed; later stages did not run
#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {error}")]
pub struct PipelineFailure {
    pub stage: &'static str,
    pub error: ProvisionError,
    /// Context as it was handed to the failing stage
    pub context: Box<JoinContext>,
}

/// Ordered, fail-fast stage sequence
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The provisioning sequence for a role
    ///
    /// The role picks the configuration plan and the node script here, once;
    /// everything else is the same for every role.
    pub fn for_role(role: Role, c: &Collaborators) -> Self {
        let plan = CollectionPlan::for_role(role);
        let script = NodeScript::for_role(role);

        Self::new(vec![
            Box::new(ClearWorkspace::new(c.workspace.clone())),
            Box::new(CreateWorkspace::new(c.workspace.clone())),
            Box::new(CollectConfiguration::new(
                plan,
                c.prompter.clone(),
                c.accounts.clone(),
            )),
            Box::new(GenerateKeys::new(c.keys.clone())),
            Box::new(AssembleConfig::new(c.config.clone())),
            Box::new(ResolveGenesis::new(c.network.clone(), c.workspace.clone())),
            Box::new(LaunchNode::new(script, c.supervisor.clone())),
            Box::new(LinkNode::new(c.node.clone())),
            Box::new(ListenForEnodes::new(ListenerPhase::PreHandshake, c.peers.clone())),
            Box::new(EnodeRequestHandler::new(c.peers.clone())),
            Box::new(EnodeResponseHandler::new(c.peers.clone())),
            Box::new(ListenForEnodes::new(ListenerPhase::PostHandshake, c.peers.clone())),
            Box::new(MonitorBalances::new(c.monitoring.clone())),
            Box::new(CollectStatistics::new(c.monitoring.clone())),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order
    pub async fn run(&self, initial: JoinContext) -> Result<JoinContext, PipelineFailure> {
        let total = self.stages.len();
        let mut ctx = initial;

        for (index, stage) in self.stages.iter().enumerate() {
            let started = Instant::now();
            tracing::info!("[{}/{}] {}", index + 1, total, stage.name());

            let snapshot = ctx.clone();
            ctx = match stage.execute(ctx).await {
                Ok(next) => next,
                Err(error) => {
                    tracing::error!("Stage {} failed: {}", stage.name(), error);
                    return Err(PipelineFailure {
                        stage: stage.name(),
                        error,
                        context: Box::new(snapshot),
                    });
                }
            };

            tracing::debug!(
                "Stage {} done in {:.2}ms",
                stage.name(),
                started.elapsed().as_secs_f64() * 1000.0
            );
        }

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use join_types::CommunicationNetwork;
    use parking_lot::Mutex;

    /// Stage that appends its name to a shared log and optionally fails
    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail_with: Option<ProvisionError>,
    }

    #[async_trait]
    impl Stage for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(&self, mut ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
            self.log.lock().push(self.name);
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }
            // Leave a trace in the context so hand-off can be checked
            ctx.communication_network.known_peers.push(self.name.to_string());
            Ok(ctx)
        }
    }

    fn context() -> JoinContext {
        JoinContext::new(
            Role::Participant,
            "10.0.0.2",
            "10.0.0.1",
            CommunicationNetwork {
                managing_node: "10.0.0.1".to_string(),
                session_id: "s".to_string(),
                topic: "t".to_string(),
                known_peers: vec![],
            },
        )
    }

    fn stage(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        fail_with: Option<ProvisionError>,
    ) -> Box<dyn Stage> {
        Box::new(Recording {
            name,
            log: log.clone(),
            fail_with,
        })
    }

    #[tokio::test]
    async fn test_output_feeds_next_stage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            stage("a", &log, None),
            stage("b", &log, None),
            stage("c", &log, None),
        ]);

        let ctx = pipeline.run(context()).await.unwrap();

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(ctx.communication_network.known_peers, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fail_fast() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failure = ProvisionError::KeyGeneration("disk full".to_string());
        let pipeline = Pipeline::new(vec![
            stage("a", &log, None),
            stage("b", &log, None),
            stage("c", &log, Some(failure.clone())),
            stage("d", &log, None),
            stage("e", &log, None),
        ]);

        let err = pipeline.run(context()).await.unwrap_err();

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(err.stage, "c");
        assert_eq!(err.error, failure);
        // Last-known context is what stage c received
        assert_eq!(err.context.communication_network.known_peers, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_first_stage_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            stage("a", &log, Some(ProvisionError::Workspace("read-only".to_string()))),
            stage("b", &log, None),
        ]);

        let err = pipeline.run(context()).await.unwrap_err();

        assert_eq!(*log.lock(), vec!["a"]);
        assert_eq!(*err.context, context());
    }

    #[tokio::test]
    async fn test_empty_pipeline_returns_input() {
        let pipeline = Pipeline::new(vec![]);
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.run(context()).await.unwrap(), context());
    }
}
