use super::download::{FolderPayloadDownloader, PayloadDownloader};
use super::local::LocalStorage;
use super::policy::{CompatibilityPolicy, LogRepairPolicy, MajorMinorPolicy};
use crate::backup::{BackupSentinel, download_sentinel};
use crate::config::RestoreConfig;
use crate::core::{BackupError, RepairPass, Result, with_deadline};
use crate::engine::{EngineConnector, EngineLauncher, MongodLauncher, RestrictedPass};
use crate::storage::Folder;
use std::sync::Arc;
use tracing::{Instrument, info, info_span};

/// State of one restore invocation.
#[derive(Debug, Clone)]
pub struct RestoreSession {
    pub backup_name: String,
    pub target_engine_version: String,
    pub sentinel: BackupSentinel,
    pub needs_log_repair: bool,
}

/// What a finished restore did.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub session: RestoreSession,
    /// Repair passes run, in order.
    pub passes: Vec<RepairPass>,
}

/// Restores one engine node from a backup in shared storage.
pub struct RestoreService {
    config: RestoreConfig,
    folder: Arc<dyn Folder>,
    local_storage: LocalStorage,
    downloader: Arc<dyn PayloadDownloader>,
    launcher: Arc<dyn EngineLauncher>,
    connector: Arc<dyn EngineConnector>,
    compatibility: Arc<dyn CompatibilityPolicy>,
    log_repair: LogRepairPolicy,
}

impl RestoreService {
    pub fn new(
        config: RestoreConfig,
        folder: Arc<dyn Folder>,
        launcher: Arc<dyn EngineLauncher>,
        connector: Arc<dyn EngineConnector>,
    ) -> Result<Self> {
        let log_repair = LogRepairPolicy::new(&config.log_repair_versions)?;
        let local_storage = LocalStorage::new(&config.data_dir, &config.lock_file_name);
        Ok(Self {
            downloader: Arc::new(FolderPayloadDownloader::new(folder.clone())),
            compatibility: Arc::new(MajorMinorPolicy),
            config,
            folder,
            local_storage,
            launcher,
            connector,
            log_repair,
        })
    }

    /// Repair passes launch `mongod` as configured in `config.engine`.
    pub fn with_mongod(
        config: RestoreConfig,
        folder: Arc<dyn Folder>,
        connector: Arc<dyn EngineConnector>,
    ) -> Result<Self> {
        let launcher = Arc::new(MongodLauncher::new(config.engine.clone()));
        Self::new(config, folder, launcher, connector)
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn PayloadDownloader>) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_compatibility_policy(mut self, policy: Arc<dyn CompatibilityPolicy>) -> Self {
        self.compatibility = policy;
        self
    }

    pub async fn do_restore(
        &self,
        backup_name: &str,
        target_engine_version: &str,
    ) -> Result<RestoreReport> {
        let span = info_span!("restore", backup_name = %backup_name, target = %target_engine_version);
        with_deadline(
            "restore",
            self.config.run_timeout_limit(),
            self.run(backup_name, target_engine_version).instrument(span),
        )
        .await
    }

    async fn run(&self, backup_name: &str, target_engine_version: &str) -> Result<RestoreReport> {
        let sentinel = download_sentinel(self.folder.as_ref(), backup_name).await?;

        let verdict = self
            .compatibility
            .check(&sentinel.engine_version, target_engine_version);
        if !verdict.compatible {
            return Err(BackupError::Incompatible {
                backup_version: sentinel.engine_version.clone(),
                target_version: target_engine_version.to_string(),
                reason: verdict.reason,
            });
        }
        info!(reason = %verdict.reason, "Engine versions are compatible");
        let needs_log_repair = self.log_repair.need_fix_oplog(target_engine_version)?;

        self.local_storage.ensure_lock_file_is_empty().await?;
        self.local_storage.cleanup_data_dir().await?;

        info!("Download backup files to the data directory");
        self.downloader
            .download(backup_name, self.local_storage.data_dir())
            .await?;

        let session = RestoreSession {
            backup_name: backup_name.to_string(),
            target_engine_version: target_engine_version.to_string(),
            needs_log_repair,
            sentinel,
        };

        let mut passes = Vec::with_capacity(2);
        let fix = RestrictedPass::fix_system_data(
            session.sentinel.last_write_ts,
            session.needs_log_repair,
        );
        self.run_pass(&fix).await?;
        passes.push(fix.pass);

        if session.needs_log_repair {
            let recover = RestrictedPass::recover_from_oplog();
            self.run_pass(&recover).await?;
            passes.push(recover.pass);
        } else {
            info!("Skipping recover-from-oplog pass, not needed for this engine version");
        }

        info!("Restore of {} finished", backup_name);
        Ok(RestoreReport { session, passes })
    }

    async fn run_pass(&self, pass: &RestrictedPass) -> Result<()> {
        pass.run(
            self.launcher.as_ref(),
            self.connector.as_ref(),
            &self.config.minimal_config_path,
        )
        .await
    }
}
