//! Node process supervisor
//!
//! Starts the role's node script and waits for its startup signal: the first
//! output on stdout means the node is up, any output on stderr means it
//! failed. The node writes into log files under the workspace rather than
//! pipes, so it keeps running after the joiner exits. One that failed or
//! timed out is killed.

use join_types::{Capability, JoinContext, ProvisionError, Role, BLOCKCHAIN_FOLDER};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// How long a node gets to print its first line
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(100);

/// Node stdout log, inside the blockchain folder
pub const NODE_STDOUT_LOG: &str = "node.out";
/// Node stderr log, inside the blockchain folder
pub const NODE_STDERR_LOG: &str = "node.err";

const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Node start script, one per role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeScript {
    MakerVoter,
    Maker,
    Voter,
    Participant,
}

impl NodeScript {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::CombinedMakerVoter => Self::MakerVoter,
            Role::MakerOnly => Self::Maker,
            Role::VoterOnly => Self::Voter,
            Role::Participant => Self::Participant,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::MakerVoter => "startQuorumBMAndBVNode.sh",
            Self::Maker => "startQuorumBMNode.sh",
            Self::Voter => "startQuorumBVNode.sh",
            Self::Participant => "startQuorumParticipantNode.sh",
        }
    }

    /// Positional arguments drawn from the context
    pub fn args(&self, ctx: &JoinContext) -> Result<Vec<String>, ProvisionError> {
        let args = match self {
            Self::MakerVoter => {
                let (min, max) = ctx.block_interval()?;
                vec![
                    ctx.primary_account(Capability::Voter)?.to_string(),
                    ctx.primary_account(Capability::Maker)?.to_string(),
                    min.to_string(),
                    max.to_string(),
                ]
            }
            Self::Maker => {
                let (min, max) = ctx.block_interval()?;
                vec![
                    ctx.primary_account(Capability::Maker)?.to_string(),
                    min.to_string(),
                    max.to_string(),
                ]
            }
            Self::Voter => {
                let (min, max) = ctx.block_interval()?;
                vec![
                    ctx.primary_account(Capability::Voter)?.to_string(),
                    min.to_string(),
                    max.to_string(),
                ]
            }
            Self::Participant => Vec::new(),
        };
        Ok(args)
    }
}

/// A fully resolved command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory holding the start scripts
    pub scripts_dir: PathBuf,
    /// Directory the node runs in (the workspace root)
    pub working_dir: PathBuf,
    pub startup_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("."),
            working_dir: PathBuf::from("."),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }
}

/// Files a node's stdout and stderr are written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutput {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl NodeOutput {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            stdout: dir.join(NODE_STDOUT_LOG),
            stderr: dir.join(NODE_STDERR_LOG),
        }
    }

    /// Truncate both logs and hand them out as the node's stdio
    async fn create(&self) -> Result<(Stdio, Stdio), ProvisionError> {
        if let Some(dir) = self.stdout.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(launch_failure)?;
        }
        let stdout = tokio::fs::File::create(&self.stdout)
            .await
            .map_err(launch_failure)?
            .into_std()
            .await;
        let stderr = tokio::fs::File::create(&self.stderr)
            .await
            .map_err(launch_failure)?
            .into_std()
            .await;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    async fn read(&self) -> Result<(String, String), ProvisionError> {
        let stdout = tokio::fs::read(&self.stdout).await.map_err(launch_failure)?;
        let stderr = tokio::fs::read(&self.stderr).await.map_err(launch_failure)?;
        Ok((
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }
}

/// A node that signalled startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedNode {
    pub pid: Option<u32>,
    /// The line that counted as the startup signal
    pub first_line: String,
    pub output: NodeOutput,
}

pub struct NodeSupervisor {
    config: SupervisorConfig,
}

impl NodeSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Resolve the command line for a script against the context
    pub fn launch_spec(
        &self,
        script: NodeScript,
        ctx: &JoinContext,
    ) -> Result<LaunchSpec, ProvisionError> {
        Ok(LaunchSpec {
            program: self.config.scripts_dir.join(script.file_name()),
            args: script.args(ctx)?,
        })
    }

    /// Start the node and wait for its startup signal
    pub async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedNode, ProvisionError> {
        tracing::info!("Starting node: {} {}", spec.program.display(), spec.args.join(" "));

        let output = NodeOutput::in_dir(&self.config.working_dir.join(BLOCKCHAIN_FOLDER));
        let (stdout, stderr) = output.create().await?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        // Own process group, so a Ctrl+C aimed at the joiner spares the node
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            ProvisionError::LaunchFailure(format!("{}: {}", spec.program.display(), e))
        })?;
        let pid = child.id();

        match await_startup_signal(&mut child, &output, self.config.startup_timeout).await {
            Ok(first_line) => {
                tracing::info!("Node started (pid {:?}): {}", pid, first_line);
                tracing::info!("Node output goes to {}", output.stdout.display());
                detach(child);
                Ok(LaunchedNode {
                    pid,
                    first_line,
                    output,
                })
            }
            Err(e) => {
                tracing::error!("Node failed to start: {}", e);
                kill(&mut child).await;
                Err(e)
            }
        }
    }
}

/// Poll the node's logs until it signals startup, exits, or runs out of time
async fn await_startup_signal(
    child: &mut Child,
    output: &NodeOutput,
    timeout: Duration,
) -> Result<String, ProvisionError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut poll = tokio::time::interval(OUTPUT_POLL_INTERVAL);

    loop {
        poll.tick().await;

        // Exit status first, so output written just before exiting is still read
        let exited = child.try_wait().map_err(launch_failure)?.is_some();
        let (out, err) = output.read().await?;
        if let Some(signal) = startup_signal(&out, &err, exited) {
            return signal;
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ProvisionError::LaunchTimeout(timeout));
        }
    }
}

/// Decide the startup outcome from the output written so far
///
/// stderr is checked first, so a failure beats a success that showed up in
/// the same poll. `None` means keep waiting.
pub fn startup_signal(
    out: &str,
    err: &str,
    exited: bool,
) -> Option<Result<String, ProvisionError>> {
    if let Some(line) = first_line(err) {
        return Some(Err(ProvisionError::LaunchFailure(line)));
    }
    if let Some(line) = first_line(out) {
        return Some(Ok(line));
    }
    exited.then(|| {
        Err(ProvisionError::LaunchFailure(
            "exited before signalling startup".to_string(),
        ))
    })
}

fn first_line(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    Some(text.lines().next().unwrap_or_default().to_string())
}

fn launch_failure(e: std::io::Error) -> ProvisionError {
    ProvisionError::LaunchFailure(e.to_string())
}

/// Reap the node if it exits while the joiner is still around
///
/// Nothing the node holds points back at the joiner, so dropping this task
/// with the runtime leaves the node running.
fn detach(mut child: Child) {
    tokio::spawn(async move {
        let pid = child.id();
        match child.wait().await {
            Ok(status) => tracing::info!("Node (pid {:?}) exited: {}", pid, status),
            Err(e) => tracing::warn!("Lost track of node (pid {:?}): {}", pid, e),
        }
    });
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill node (pid {:?}): {}", child.id(), e);
    }
}
