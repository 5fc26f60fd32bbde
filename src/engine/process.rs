use crate::backup::LogTimestamp;
use crate::core::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Restricted startup modes the restore drives the engine through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupMode {
    /// Background session-cache refresh off, so repair can rewrite system data.
    DisableLogicalSessionCacheRefresh,
    /// Standalone start that replays the operation log on startup.
    RecoverFromOplogAsStandalone,
}

impl StartupMode {
    /// `--setParameter` values the engine is started with.
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            StartupMode::DisableLogicalSessionCacheRefresh => {
                &["disableLogicalSessionCacheRefresh=true"]
            }
            StartupMode::RecoverFromOplogAsStandalone => &[
                "recoverFromOplogAsStandalone=true",
                "takeUnstableCheckpointOnShutdown=true",
            ],
        }
    }
}

impl fmt::Display for StartupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupMode::DisableLogicalSessionCacheRefresh => {
                write!(f, "disable-logical-session-cache-refresh")
            }
            StartupMode::RecoverFromOplogAsStandalone => {
                write!(f, "recover-from-oplog-as-standalone")
            }
        }
    }
}

/// Starts temporary engine instances.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn start(&self, mode: StartupMode, config_path: &Path) -> Result<Box<dyn EngineProcess>>;
}

/// A running engine subprocess.
#[async_trait]
pub trait EngineProcess: Send {
    /// Connection target of the instance, e.g. `mongodb://localhost:27018`.
    fn endpoint(&self) -> String;

    /// Blocks until the OS process has exited; a non-zero exit is an error.
    async fn wait(&mut self) -> Result<()>;
}

/// Opens client sessions to a running engine.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn EngineService>>;
}

/// Administrative client session to a temporary engine instance.
#[async_trait]
pub trait EngineService: Send + Sync {
    /// Rewrites replication and system collections after a binary restore.
    async fn fix_system_data_after_restore(
        &self,
        last_write_ts: Option<LogTimestamp>,
        need_fix_oplog: bool,
    ) -> Result<()>;

    /// Asks the engine to shut down cleanly.
    async fn shutdown(&self) -> Result<()>;
}
