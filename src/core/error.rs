use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which restricted-mode repair pass an engine lifecycle error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPass {
    FixSystemData,
    RecoverFromOplog,
}

impl fmt::Display for RepairPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairPass::FixSystemData => write!(f, "fix-system-data"),
            RepairPass::RecoverFromOplog => write!(f, "recover-from-oplog"),
        }
    }
}

/// Step of the engine subprocess envelope that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    Launch,
    Connect,
    Repair,
    Shutdown,
    Wait,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleStage::Launch => "launch",
            LifecycleStage::Connect => "connect",
            LifecycleStage::Repair => "repair",
            LifecycleStage::Shutdown => "shutdown",
            LifecycleStage::Wait => "wait",
        };
        f.write_str(name)
    }
}

/// One node whose remote invocation exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub content_id: i32,
    pub host: String,
    pub exit_code: i32,
    pub stderr: String,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segment {} on {} exited with {}: {}",
            self.content_id,
            self.host,
            self.exit_code,
            self.stderr.trim()
        )
    }
}

fn join_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Object '{0}' not found")]
    ObjectNotFound(String),

    #[error("{message} ({} node(s) failed): {}", .failures.len(), join_failures(.failures))]
    ClusterCommand {
        message: String,
        failures: Vec<NodeFailure>,
    },

    #[error("Restore point '{name}' failed: {reason}")]
    RestorePoint { name: String, reason: String },

    #[error("Failed to download the segment backup {backup_id} metadata (tried {retries} times): {source}")]
    SegmentMetadata {
        backup_id: String,
        retries: u32,
        #[source]
        source: Box<BackupError>,
    },

    #[error("Sentinel for backup '{backup_name}' is incomplete: {reason}")]
    IncompleteSentinel { backup_name: String, reason: String },

    #[error("Failed to upload sentinel file for backup {backup_name}: {source}")]
    SentinelUpload {
        backup_name: String,
        #[source]
        source: Box<BackupError>,
    },

    #[error("Backup '{0}' not found")]
    BackupNotFound(String),

    #[error("Cannot restore backup taken with version {backup_version} onto {target_version}: {reason}")]
    Incompatible {
        backup_version: String,
        target_version: String,
        reason: String,
    },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Failed to stage backup payload: {0}")]
    Staging(String),

    #[error("Restore {pass} pass failed at {stage}: {source}")]
    RepairPass {
        pass: RepairPass,
        stage: LifecycleStage,
        #[source]
        source: Box<BackupError>,
    },

    #[error("Engine process error: {0}")]
    Process(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{operation} did not finish within {limit:?}")]
    Timeout { operation: String, limit: Duration },
}

pub type Result<T> = std::result::Result<T, BackupError>;

impl BackupError {
    /// Wraps `self` with the repair pass and lifecycle stage it came from.
    pub fn in_pass(self, pass: RepairPass, stage: LifecycleStage) -> Self {
        BackupError::RepairPass {
            pass,
            stage,
            source: Box::new(self),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackupError::ObjectNotFound(_))
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<tokio_postgres::Error> for BackupError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_command_error_names_every_failed_node() {
        let err = BackupError::ClusterCommand {
            message: "Unable to run backup".to_string(),
            failures: vec![
                NodeFailure {
                    content_id: 0,
                    host: "sdw1".to_string(),
                    exit_code: 1,
                    stderr: "disk full\n".to_string(),
                },
                NodeFailure {
                    content_id: 2,
                    host: "sdw2".to_string(),
                    exit_code: 255,
                    stderr: "ssh: connect refused".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 node(s) failed"));
        assert!(text.contains("segment 0 on sdw1 exited with 1: disk full"));
        assert!(text.contains("segment 2 on sdw2"));
    }

    #[test]
    fn repair_pass_wrapping_keeps_the_cause() {
        let err = BackupError::Process("exit status 14".to_string())
            .in_pass(RepairPass::RecoverFromOplog, LifecycleStage::Wait);
        assert_eq!(
            err.to_string(),
            "Restore recover-from-oplog pass failed at wait: Engine process error: exit status 14"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
