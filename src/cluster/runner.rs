use crate::core::{BackupError, ClusterTopology, NodeFailure, Result, SegmentDescriptor};
use async_trait::async_trait;

/// A command line bound for one node of the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub content_id: i32,
    pub host: String,
    pub command: String,
}

/// Captured result of one remote invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommandResult {
    pub content_id: i32,
    pub host: String,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ShellCommandResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Every per-node result of one fan-out, ordered by content id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub commands: Vec<ShellCommandResult>,
}

impl RemoteOutput {
    pub fn new(mut commands: Vec<ShellCommandResult>) -> Self {
        commands.sort_by_key(|command| command.content_id);
        Self { commands }
    }

    pub fn failures(&self) -> Vec<NodeFailure> {
        self.commands
            .iter()
            .filter(|command| !command.succeeded())
            .map(|command| NodeFailure {
                content_id: command.content_id,
                host: command.host.clone(),
                exit_code: command.exit_code,
                stderr: command.stderr.clone(),
            })
            .collect()
    }

    /// Merges any non-zero exit into one aggregate error.
    pub fn check_cluster_error(&self, message: &str) -> Result<()> {
        let failures = self.failures();
        if failures.is_empty() {
            return Ok(());
        }
        Err(BackupError::ClusterCommand {
            message: message.to_string(),
            failures,
        })
    }
}

/// Runs commands on cluster nodes in parallel and joins on all of them.
#[async_trait]
pub trait ClusterCommandRunner: Send + Sync {
    /// Executes every command concurrently and returns once all have finished.
    ///
    /// A node failing is reported through its exit code, not as `Err`; `Err`
    /// is reserved for failures of the runner itself.
    async fn execute(&self, commands: Vec<RemoteCommand>) -> Result<RemoteOutput>;
}

/// Builds one command per targeted segment and runs them all.
pub async fn run_on_all_nodes<F>(
    runner: &dyn ClusterCommandRunner,
    topology: &ClusterTopology,
    include_coordinator: bool,
    mut build: F,
) -> Result<RemoteOutput>
where
    F: FnMut(&SegmentDescriptor) -> Result<String>,
{
    let mut commands = Vec::with_capacity(topology.len());
    for segment in topology.targets(include_coordinator) {
        commands.push(RemoteCommand {
            content_id: segment.content_id,
            host: segment.hostname.clone(),
            command: build(segment)?,
        });
    }
    runner.execute(commands).await
}
