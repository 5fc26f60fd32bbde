use super::process::{EngineLauncher, EngineProcess, StartupMode};
use crate::core::{BackupError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the temporary engine instance is started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineLaunchConfig {
    pub binary: String,
    pub host: String,
    pub port: u16,
    /// How long to wait for the instance to accept connections.
    pub startup_timeout_ms: u64,
    /// Arguments appended after the generated ones.
    pub extra_args: Vec<String>,
}

impl Default for EngineLaunchConfig {
    fn default() -> Self {
        Self {
            binary: "mongod".to_string(),
            host: "localhost".to_string(),
            port: 27018,
            startup_timeout_ms: 60_000,
            extra_args: Vec::new(),
        }
    }
}

impl EngineLaunchConfig {
    pub fn binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn extra_arg(mut self, arg: &str) -> Self {
        self.extra_args.push(arg.to_string());
        self
    }

    /// Command line arguments for one start in `mode`.
    pub fn arguments(&self, mode: StartupMode, config_path: &Path) -> Vec<String> {
        let mut args = vec![
            "--config".to_string(),
            config_path.display().to_string(),
            "--bind_ip".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        for parameter in mode.parameters() {
            args.push("--setParameter".to_string());
            args.push((*parameter).to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Launches `mongod` as a child process and waits until it listens.
#[derive(Debug, Clone, Default)]
pub struct MongodLauncher {
    config: EngineLaunchConfig,
}

impl MongodLauncher {
    pub fn new(config: EngineLaunchConfig) -> Self {
        Self { config }
    }

    async fn wait_until_ready(&self, child: &mut Child) -> Result<()> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let deadline =
            Instant::now().checked_add(Duration::from_millis(self.config.startup_timeout_ms));
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(BackupError::Process(format!(
                    "{} exited during startup with {}",
                    self.config.binary, status
                )));
            }
            match TcpStream::connect(&address).await {
                Ok(_) => {
                    // The port may belong to another process; the child must outlive one poll.
                    sleep(READINESS_POLL_INTERVAL).await;
                    if let Some(status) = child.try_wait()? {
                        return Err(BackupError::Process(format!(
                            "{} exited with {} while {} was accepting connections",
                            self.config.binary, status, address
                        )));
                    }
                    info!(address = %address, pid = ?child.id(), "Engine accepting connections");
                    return Ok(());
                }
                Err(err) => debug!(address = %address, error = %err, "engine not accepting connections yet"),
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(BackupError::Process(format!(
                    "{} did not accept connections on {} within {}ms",
                    self.config.binary, address, self.config.startup_timeout_ms
                )));
            }
            sleep(READINESS_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl EngineLauncher for MongodLauncher {
    async fn start(&self, mode: StartupMode, config_path: &Path) -> Result<Box<dyn EngineProcess>> {
        let args = self.config.arguments(mode, config_path);
        info!(binary = %self.config.binary, mode = %mode, "Starting engine in restricted mode");
        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                BackupError::Process(format!("failed to spawn {}: {}", self.config.binary, err))
            })?;

        if let Err(err) = self.wait_until_ready(&mut child).await {
            if let Err(kill_err) = child.kill().await {
                warn!(error = %kill_err, "failed to kill engine after startup failure");
            }
            return Err(err);
        }

        Ok(Box::new(MongodProcess {
            child,
            endpoint: format!("mongodb://{}:{}", self.config.host, self.config.port),
            binary: self.config.binary.clone(),
        }))
    }
}

/// A `mongod` child; killed if dropped before it exits.
pub struct MongodProcess {
    child: Child,
    endpoint: String,
    binary: String,
}

#[async_trait]
impl EngineProcess for MongodProcess {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn wait(&mut self) -> Result<()> {
        let status = self.child.wait().await?;
        if status.success() {
            info!(binary = %self.binary, "Engine exited cleanly");
            Ok(())
        } else {
            Err(BackupError::Process(format!("{} exited with {}", self.binary, status)))
        }
    }
}
