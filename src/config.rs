//! Run configuration for backup and restore orchestration.
//!
//! Both structs deserialize from JSON with every field optional, falling back
//! to the defaults below. They are passed explicitly into constructors.

use crate::core::{BackupError, Result, SegmentFwdArg};
use crate::engine::EngineLaunchConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|err| {
        BackupError::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            err
        ))
    })?;
    serde_json::from_slice(&bytes).map_err(|err| {
        BackupError::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            err
        ))
    })
}

/// Bounded retry with exponential backoff for segment metadata fetches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetadataRetryPolicy {
    /// Retries allowed per segment before the aggregation aborts.
    pub max_retries: u32,
    /// First backoff delay in seconds.
    pub min_backoff_secs: u64,
    /// Backoff ceiling in seconds.
    pub max_backoff_secs: u64,
}

impl Default for MetadataRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_backoff_secs: 5,
            max_backoff_secs: 60,
        }
    }
}

impl MetadataRetryPolicy {
    pub fn min_backoff(&self) -> Duration {
        Duration::from_secs(self.min_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

/// Cluster backup settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackupConfig {
    /// Prepended to the formatted start time to name a backup.
    pub backup_name_prefix: String,
    /// Environment variable carrying the segment's port on the remote side.
    pub port_env_var: String,
    /// Worker binary executed on every node.
    pub worker_binary: String,
    /// Sub-command the worker runs to back up its local data directory.
    pub segment_subcommand: String,
    /// Config file path handed to every worker as `--config=`.
    pub forwarded_config_path: Option<String>,
    /// Extra `--name=value` flags handed to every worker.
    pub forwarded_args: Vec<SegmentFwdArg>,
    /// libpq connection string of the coordinator node.
    pub control_connection: String,
    /// Whether the coordinator node is backed up together with the segments.
    pub include_coordinator: bool,
    pub metadata_retry: MetadataRetryPolicy,
    /// Wall-clock bound for one whole backup run.
    pub run_timeout_secs: Option<u64>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_name_prefix: "backup_".to_string(),
            port_env_var: "PGPORT".to_string(),
            worker_binary: "clusterbackup".to_string(),
            segment_subcommand: "pg backup-push".to_string(),
            forwarded_config_path: None,
            forwarded_args: Vec::new(),
            control_connection: "host=localhost dbname=postgres".to_string(),
            include_coordinator: true,
            metadata_retry: MetadataRetryPolicy::default(),
            run_timeout_secs: None,
        }
    }
}

impl BackupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }

    pub fn worker_binary(mut self, binary: &str) -> Self {
        self.worker_binary = binary.to_string();
        self
    }

    pub fn forwarded_config_path(mut self, path: &str) -> Self {
        self.forwarded_config_path = Some(path.to_string());
        self
    }

    pub fn forward_arg(mut self, name: &str, value: &str) -> Self {
        self.forwarded_args.push(SegmentFwdArg::new(name, value));
        self
    }

    pub fn control_connection(mut self, conn_str: &str) -> Self {
        self.control_connection = conn_str.to_string();
        self
    }

    pub fn metadata_retry(mut self, policy: MetadataRetryPolicy) -> Self {
        self.metadata_retry = policy;
        self
    }

    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn run_timeout_limit(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// Inclusive `major.minor` range of engine versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionRange {
    pub min: String,
    pub max: String,
}

/// Single-node restore settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RestoreConfig {
    /// Destination data directory of the engine.
    pub data_dir: PathBuf,
    /// Lock marker inside the data directory; must be empty or absent.
    pub lock_file_name: String,
    /// Minimal engine configuration used by the repair passes.
    pub minimal_config_path: PathBuf,
    /// Target versions that need the second, log-recovery pass.
    pub log_repair_versions: VersionRange,
    /// How the temporary engine instance is launched for the repair passes.
    pub engine: EngineLaunchConfig,
    /// Wall-clock bound for one whole restore run.
    pub run_timeout_secs: Option<u64>,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/mongodb"),
            lock_file_name: "mongod.lock".to_string(),
            minimal_config_path: PathBuf::from("/etc/mongod-restore.conf"),
            log_repair_versions: VersionRange {
                min: "4.2".to_string(),
                max: "4.4".to_string(),
            },
            engine: EngineLaunchConfig::default(),
            run_timeout_secs: None,
        }
    }
}

impl RestoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>, minimal_config_path: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            minimal_config_path: minimal_config_path.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }

    pub fn log_repair_versions(mut self, min: &str, max: &str) -> Self {
        self.log_repair_versions = VersionRange {
            min: min.to_string(),
            max: max.to_string(),
        };
        self
    }

    pub fn engine(mut self, engine: EngineLaunchConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn run_timeout_limit(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Path of the lock marker inside the data directory.
    pub fn lock_file_path(&self) -> PathBuf {
        self.data_dir.join(&self.lock_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(
            &path,
            r#"{"worker_binary": "/usr/bin/clusterbackup", "metadata_retry": {"max_retries": 2}}"#,
        )
        .unwrap();

        let config = BackupConfig::from_json_file(&path).unwrap();
        assert_eq!(config.worker_binary, "/usr/bin/clusterbackup");
        assert_eq!(config.metadata_retry.max_retries, 2);
        assert_eq!(config.metadata_retry.min_backoff(), Duration::from_secs(5));
        assert_eq!(config.backup_name_prefix, "backup_");
        assert!(config.include_coordinator);
        assert!(config.forwarded_args.is_empty());
    }

    #[test]
    fn unreadable_config_is_a_config_error() {
        let err = RestoreConfig::from_json_file("/nonexistent/restore.json").unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }

    #[test]
    fn builders_set_fields() {
        let config = RestoreConfig::new("/data", "/etc/min.conf")
            .log_repair_versions("4.2", "4.2")
            .run_timeout(Duration::from_secs(90));
        assert_eq!(config.log_repair_versions.max, "4.2");
        assert_eq!(config.run_timeout_limit(), Some(Duration::from_secs(90)));
        assert_eq!(config.lock_file_name, "mongod.lock");
    }
}
