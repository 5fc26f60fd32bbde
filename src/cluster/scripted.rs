use super::runner::{ClusterCommandRunner, RemoteCommand, RemoteOutput, ShellCommandResult};
use crate::core::Result;
use async_trait::async_trait;
use futures::future::{BoxFuture, join_all};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Callback awaited for every command the scripted runner "executes".
pub type RemoteCommandHook = Arc<dyn Fn(RemoteCommand) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
struct ScriptedFailure {
    exit_code: i32,
    stderr: String,
}

/// An in-memory [`ClusterCommandRunner`] for tests.
///
/// Every command succeeds unless a failure was scripted for its content id.
/// An optional hook runs for each successful command, which lets tests play
/// the part of the remote worker (e.g. writing segment backups to storage).
#[derive(Clone, Default)]
pub struct ScriptedCommandRunner {
    failures: Arc<Mutex<HashMap<i32, ScriptedFailure>>>,
    executed: Arc<Mutex<Vec<RemoteCommand>>>,
    hook: Option<RemoteCommandHook>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: RemoteCommandHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Makes the node with `content_id` exit with `exit_code`.
    pub async fn fail_node(&self, content_id: i32, exit_code: i32, stderr: impl Into<String>) {
        let mut failures = self.failures.lock().await;
        failures.insert(
            content_id,
            ScriptedFailure {
                exit_code,
                stderr: stderr.into(),
            },
        );
    }

    /// Commands received so far, in dispatch order.
    pub async fn executed(&self) -> Vec<RemoteCommand> {
        self.executed.lock().await.clone()
    }

    async fn run_one(&self, command: RemoteCommand) -> ShellCommandResult {
        let failure = self.failures.lock().await.get(&command.content_id).cloned();
        self.executed.lock().await.push(command.clone());

        match failure {
            Some(failure) => ShellCommandResult {
                content_id: command.content_id,
                host: command.host,
                command: command.command,
                stdout: String::new(),
                stderr: failure.stderr,
                exit_code: failure.exit_code,
            },
            None => {
                if let Some(hook) = self.hook.as_ref() {
                    hook(command.clone()).await;
                }
                ShellCommandResult {
                    content_id: command.content_id,
                    host: command.host,
                    command: command.command,
                    stdout: String::new(),
                    stderr: format!("segment {} backup finished\n", command.content_id),
                    exit_code: 0,
                }
            }
        }
    }
}

#[async_trait]
impl ClusterCommandRunner for ScriptedCommandRunner {
    async fn execute(&self, commands: Vec<RemoteCommand>) -> Result<RemoteOutput> {
        let results = join_all(commands.into_iter().map(|command| self.run_one(command))).await;
        Ok(RemoteOutput::new(results))
    }
}
