// ============================================================================
// clusterbackup Library
// ============================================================================

//! Orchestration core for backing up a sharded database cluster and
//! restoring a single engine node from a backup.
//!
//! [`BackupHandler`] fans segment backups out over a [`ClusterCommandRunner`],
//! takes a cluster-consistent restore point, collects segment metadata and
//! publishes one [`BackupSentinel`]. [`RestoreService`] validates a sentinel,
//! stages its payload and repairs the engine through restricted-mode passes.
//!
//! Every collaborator sits behind a trait; in-memory implementations
//! ([`MemoryFolder`], [`ScriptedCommandRunner`], [`ScriptedEngine`],
//! [`RecordingSleepDriver`]) ship with the crate for tests.

pub mod backup;
pub mod cluster;
pub mod config;
pub mod control;
pub mod core;
pub mod engine;
pub mod restore;
pub mod retry;
pub mod storage;

pub use backup::{BackupArguments, BackupHandler, BackupSentinel, BackupWorkers};
pub use cluster::{ClusterCommandRunner, ScriptedCommandRunner, SshCommandRunner};
pub use config::{BackupConfig, MetadataRetryPolicy, RestoreConfig};
pub use control::{ClusterInfo, ControlConnection, ControlConnector, PgControlConnector};
pub use core::{BackupError, ClusterTopology, Result, SegmentDescriptor, SegmentUserData};
pub use engine::{EngineLaunchConfig, MongodLauncher, ScriptedEngine, StartupMode};
pub use restore::{RestoreReport, RestoreService};
pub use retry::{ExponentialSleeper, RecordingSleepDriver};
pub use storage::{Folder, FsFolder, MemoryFolder};
