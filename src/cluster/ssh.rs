use super::runner::{ClusterCommandRunner, RemoteCommand, RemoteOutput, ShellCommandResult};
use crate::core::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Settings for [`SshCommandRunner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshRunnerConfig {
    /// The ssh client binary.
    pub ssh_binary: String,
    /// Extra options passed before the host, e.g. `-o BatchMode=yes`.
    pub ssh_options: Vec<String>,
    /// Hosts on which commands run through the local shell instead of ssh.
    pub local_hosts: Vec<String>,
    /// Maximum number of nodes contacted at once.
    pub max_parallel: usize,
}

impl Default for SshRunnerConfig {
    fn default() -> Self {
        Self {
            ssh_binary: "ssh".to_string(),
            ssh_options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
            local_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            max_parallel: 64,
        }
    }
}

/// Runs commands on cluster hosts over ssh, one task per node.
#[derive(Debug, Clone, Default)]
pub struct SshCommandRunner {
    config: SshRunnerConfig,
}

impl SshCommandRunner {
    pub fn new(config: SshRunnerConfig) -> Self {
        Self { config }
    }

    fn build_process(&self, command: &RemoteCommand) -> Command {
        let mut process = if self.config.local_hosts.iter().any(|h| h == &command.host) {
            let mut process = Command::new("sh");
            process.arg("-c").arg(&command.command);
            process
        } else {
            let mut process = Command::new(&self.config.ssh_binary);
            process
                .args(&self.config.ssh_options)
                .arg(&command.host)
                .arg(&command.command);
            process
        };
        process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        process
    }

    async fn run_one(&self, command: RemoteCommand) -> ShellCommandResult {
        debug!(content_id = command.content_id, host = %command.host, "dispatching remote command");
        match self.build_process(&command).output().await {
            Ok(output) => ShellCommandResult {
                content_id: command.content_id,
                host: command.host,
                command: command.command,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            },
            Err(err) => {
                warn!(content_id = command.content_id, host = %command.host, error = %err, "failed to spawn remote command");
                ShellCommandResult {
                    content_id: command.content_id,
                    host: command.host,
                    command: command.command,
                    stdout: String::new(),
                    stderr: format!("failed to spawn {}: {}", self.config.ssh_binary, err),
                    exit_code: -1,
                }
            }
        }
    }
}

#[async_trait]
impl ClusterCommandRunner for SshCommandRunner {
    async fn execute(&self, commands: Vec<RemoteCommand>) -> Result<RemoteOutput> {
        let parallel = self.config.max_parallel.max(1);
        let results = stream::iter(commands)
            .map(|command| self.run_one(command))
            .buffer_unordered(parallel)
            .collect::<Vec<_>>()
            .await;
        Ok(RemoteOutput::new(results))
    }
}
