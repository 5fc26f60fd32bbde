use super::aggregator::SegmentMetadataAggregator;
use super::command::SegmentCommandBuilder;
use super::metadata::{MetadataSource, SegmentBackupLocator};
use super::naming::format_backup_name;
use super::sentinel::{BackupSentinel, CurrentBackupInfo, SentinelUserData, upload_sentinel};
use crate::cluster::{ClusterCommandRunner, SshCommandRunner, run_on_all_nodes};
use crate::config::BackupConfig;
use crate::control::{ClusterInfo, ControlConnector, PgControlConnector, RestorePointCoordinator};
use crate::core::{
    BackupError, Result, SegmentDescriptor, SegmentFwdArg, SegmentUserData, with_deadline,
};
use crate::retry::{SleepDriver, TokioSleepDriver};
use crate::storage::Folder;
use chrono::Utc;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};

/// Caller-provided options of one backup run.
#[derive(Debug, Clone, Default)]
pub struct BackupArguments {
    pub is_permanent: bool,
    pub user_data: Option<SentinelUserData>,
    pub segment_fwd_args: Vec<SegmentFwdArg>,
}

impl BackupArguments {
    pub fn new(
        is_permanent: bool,
        user_data: Option<SentinelUserData>,
        segment_fwd_args: Vec<SegmentFwdArg>,
    ) -> Self {
        Self {
            is_permanent,
            user_data,
            segment_fwd_args,
        }
    }
}

/// Collaborators the backup handler drives.
#[derive(Clone)]
pub struct BackupWorkers {
    pub folder: Arc<dyn Folder>,
    pub runner: Arc<dyn ClusterCommandRunner>,
    pub connector: Arc<dyn ControlConnector>,
    pub metadata_source: Arc<dyn MetadataSource>,
    pub sleep_driver: Arc<dyn SleepDriver>,
}

impl BackupWorkers {
    /// Metadata is located in `folder` and backoff sleeps on the tokio timer.
    pub fn new(
        folder: Arc<dyn Folder>,
        runner: Arc<dyn ClusterCommandRunner>,
        connector: Arc<dyn ControlConnector>,
    ) -> Self {
        Self {
            metadata_source: Arc::new(SegmentBackupLocator::new(folder.clone())),
            folder,
            runner,
            connector,
            sleep_driver: Arc::new(TokioSleepDriver),
        }
    }

    /// Workers that reach the cluster over ssh and the coordinator over
    /// the PostgreSQL protocol.
    pub fn connect_cluster(folder: Arc<dyn Folder>, config: &BackupConfig) -> Self {
        Self::new(
            folder,
            Arc::new(SshCommandRunner::default()),
            Arc::new(PgControlConnector::new(config.control_connection.clone())),
        )
    }

    pub fn with_metadata_source(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.metadata_source = source;
        self
    }

    pub fn with_sleep_driver(mut self, driver: Arc<dyn SleepDriver>) -> Self {
        self.sleep_driver = driver;
        self
    }
}

/// Takes one cluster-consistent backup.
///
/// The stages run strictly in order: name the backup, run the segment
/// backups on every node, connect to the coordinator, create the restore
/// point, fetch segment metadata, assemble the sentinel and upload it.
pub struct BackupHandler {
    arguments: BackupArguments,
    workers: BackupWorkers,
    config: BackupConfig,
    cluster: ClusterInfo,
}

impl BackupHandler {
    /// Reads the cluster layout through a temporary control connection.
    pub async fn new(
        arguments: BackupArguments,
        workers: BackupWorkers,
        config: BackupConfig,
    ) -> Result<Self> {
        let cluster = ClusterInfo::discover(workers.connector.as_ref()).await?;
        Ok(Self::with_cluster_info(arguments, workers, config, cluster))
    }

    pub fn with_cluster_info(
        arguments: BackupArguments,
        workers: BackupWorkers,
        config: BackupConfig,
        cluster: ClusterInfo,
    ) -> Self {
        Self {
            arguments,
            workers,
            config,
            cluster,
        }
    }

    pub fn cluster(&self) -> &ClusterInfo {
        &self.cluster
    }

    /// Runs the whole backup and returns the uploaded sentinel.
    pub async fn handle_backup_push(&self) -> Result<BackupSentinel> {
        let start_time = Utc::now();
        let backup_name = format_backup_name(&self.config.backup_name_prefix, start_time);
        let span = info_span!("backup.push", backup_name = %backup_name);

        with_deadline(
            "backup push",
            self.config.run_timeout_limit(),
            self.run(backup_name, start_time).instrument(span),
        )
        .await
    }

    async fn run(
        &self,
        backup_name: String,
        start_time: chrono::DateTime<Utc>,
    ) -> Result<BackupSentinel> {
        let topology = &self.cluster.topology;

        info!("Running segment backups");
        let builder = SegmentCommandBuilder::new(&self.config, &self.arguments.segment_fwd_args);
        let mut segment_backups: Vec<(SegmentUserData, SegmentDescriptor)> = Vec::new();
        let output = run_on_all_nodes(
            self.workers.runner.as_ref(),
            topology,
            self.config.include_coordinator,
            |segment| {
                let user_data = SegmentUserData::new();
                let command = builder.build(segment, &user_data)?;
                info!(content_id = segment.content_id, command = %command, "Command to run on segment");
                segment_backups.push((user_data, segment.clone()));
                Ok(command)
            },
        )
        .await?;
        for command in &output.commands {
            info!(
                content_id = command.content_id,
                exit_code = command.exit_code,
                "Segment backup output:\n{}",
                command.stderr
            );
        }
        output.check_cluster_error("Unable to run segment backups")?;

        info!("Connecting to the cluster coordinator");
        let connection = self.workers.connector.connect().await?;

        let restore_lsns = RestorePointCoordinator::new(connection.as_ref(), topology)
            .create_restore_point(&backup_name)
            .await?;

        let segments_metadata = SegmentMetadataAggregator::new(
            self.workers.metadata_source.as_ref(),
            &self.config.metadata_retry,
            self.workers.sleep_driver.clone(),
        )
        .aggregate(&segment_backups)
        .await?;

        let info = CurrentBackupInfo {
            backup_name: backup_name.clone(),
            start_time,
            system_identifier: self.cluster.system_identifier,
            engine_version: self.cluster.engine_version.clone(),
            include_coordinator: self.config.include_coordinator,
            segment_backups,
            segments_metadata,
        };
        let sentinel = BackupSentinel::assemble(
            topology,
            info,
            restore_lsns,
            self.arguments.user_data.clone(),
            self.arguments.is_permanent,
        )?;

        if let Err(err) = upload_sentinel(self.workers.folder.as_ref(), &sentinel).await {
            error!(error = %err, "Failed to upload sentinel file for backup {}", backup_name);
            return Err(BackupError::SentinelUpload {
                backup_name,
                source: Box::new(err),
            });
        }
        info!("Backup {} successfully created", backup_name);
        Ok(sentinel)
    }
}
