use super::process::{EngineConnector, EngineLauncher, StartupMode};
use crate::backup::LogTimestamp;
use crate::core::{LifecycleStage, RepairPass, Result};
use std::path::Path;
use tracing::{Instrument, info, info_span};

/// What to do while the temporary engine is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    FixSystemData {
        last_write_ts: Option<LogTimestamp>,
        need_fix_oplog: bool,
    },
    /// The startup mode performs the recovery by itself.
    None,
}

/// One launch, connect, operate, shutdown, wait cycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestrictedPass {
    pub pass: RepairPass,
    pub mode: StartupMode,
    pub action: RepairAction,
}

impl RestrictedPass {
    pub fn fix_system_data(last_write_ts: Option<LogTimestamp>, need_fix_oplog: bool) -> Self {
        Self {
            pass: RepairPass::FixSystemData,
            mode: StartupMode::DisableLogicalSessionCacheRefresh,
            action: RepairAction::FixSystemData {
                last_write_ts,
                need_fix_oplog,
            },
        }
    }

    pub fn recover_from_oplog() -> Self {
        Self {
            pass: RepairPass::RecoverFromOplog,
            mode: StartupMode::RecoverFromOplogAsStandalone,
            action: RepairAction::None,
        }
    }

    /// Runs the pass to completion, returning once the engine process has
    /// exited. Errors name the pass and the stage that failed.
    pub async fn run(
        &self,
        launcher: &dyn EngineLauncher,
        connector: &dyn EngineConnector,
        config_path: &Path,
    ) -> Result<()> {
        let span = info_span!("restore.pass", pass = %self.pass, mode = %self.mode);
        self.run_inner(launcher, connector, config_path)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        launcher: &dyn EngineLauncher,
        connector: &dyn EngineConnector,
        config_path: &Path,
    ) -> Result<()> {
        let pass = self.pass;
        let mut process = launcher
            .start(self.mode, config_path)
            .await
            .map_err(|err| err.in_pass(pass, LifecycleStage::Launch))?;

        let endpoint = process.endpoint();
        info!(endpoint = %endpoint, "Engine started");
        let service = connector
            .connect(&endpoint)
            .await
            .map_err(|err| err.in_pass(pass, LifecycleStage::Connect))?;

        if let RepairAction::FixSystemData {
            last_write_ts,
            need_fix_oplog,
        } = self.action
        {
            info!(need_fix_oplog, "Fixing system data after restore");
            service
                .fix_system_data_after_restore(last_write_ts, need_fix_oplog)
                .await
                .map_err(|err| err.in_pass(pass, LifecycleStage::Repair))?;
        }

        service
            .shutdown()
            .await
            .map_err(|err| err.in_pass(pass, LifecycleStage::Shutdown))?;
        process
            .wait()
            .await
            .map_err(|err| err.in_pass(pass, LifecycleStage::Wait))?;
        info!("Engine pass finished");
        Ok(())
    }
}
