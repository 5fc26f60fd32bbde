use super::process::{EngineConnector, EngineLauncher, EngineProcess, EngineService, StartupMode};
use crate::backup::LogTimestamp;
use crate::core::{BackupError, LifecycleStage, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One observable step of a scripted engine's life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Started { mode: StartupMode, config_path: PathBuf },
    Connected { endpoint: String },
    FixedSystemData {
        last_write_ts: Option<LogTimestamp>,
        need_fix_oplog: bool,
    },
    ShutdownRequested,
    Exited { mode: StartupMode },
}

#[derive(Default)]
struct EngineState {
    journal: Vec<EngineEvent>,
    failures: HashSet<(StartupMode, LifecycleStage)>,
    running: usize,
    max_running: usize,
}

/// An in-memory engine for tests: launcher, connector and service in one.
///
/// Every call is appended to a shared journal, and any lifecycle stage can be
/// scripted to fail for a given startup mode.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<EngineState>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `stage` fail whenever the engine runs in `mode`.
    pub fn fail_at(&self, mode: StartupMode, stage: LifecycleStage) -> Result<()> {
        self.lock()?.failures.insert((mode, stage));
        Ok(())
    }

    pub fn journal(&self) -> Result<Vec<EngineEvent>> {
        Ok(self.lock()?.journal.clone())
    }

    /// Largest number of instances that were alive at the same time.
    pub fn max_concurrent_instances(&self) -> Result<usize> {
        Ok(self.lock()?.max_running)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| BackupError::Process("scripted engine state poisoned".to_string()))
    }

    fn check(&self, mode: StartupMode, stage: LifecycleStage) -> Result<()> {
        if self.lock()?.failures.contains(&(mode, stage)) {
            return Err(BackupError::Process(format!(
                "scripted {} failure in {} mode",
                stage, mode
            )));
        }
        Ok(())
    }

    fn record(&self, event: EngineEvent) -> Result<()> {
        self.lock()?.journal.push(event);
        Ok(())
    }

    fn current_mode(&self, endpoint: &str) -> Result<StartupMode> {
        match endpoint.rsplit('/').next() {
            Some("disable-logical-session-cache-refresh") => {
                Ok(StartupMode::DisableLogicalSessionCacheRefresh)
            }
            Some("recover-from-oplog-as-standalone") => {
                Ok(StartupMode::RecoverFromOplogAsStandalone)
            }
            _ => Err(BackupError::Connection(format!(
                "unknown scripted endpoint {}",
                endpoint
            ))),
        }
    }
}

#[async_trait]
impl EngineLauncher for ScriptedEngine {
    async fn start(&self, mode: StartupMode, config_path: &Path) -> Result<Box<dyn EngineProcess>> {
        self.check(mode, LifecycleStage::Launch)?;
        {
            let mut state = self.lock()?;
            state.journal.push(EngineEvent::Started {
                mode,
                config_path: config_path.to_path_buf(),
            });
            state.running += 1;
            state.max_running = state.max_running.max(state.running);
        }
        Ok(Box::new(ScriptedProcess {
            engine: self.clone(),
            mode,
            exited: false,
        }))
    }
}

#[async_trait]
impl EngineConnector for ScriptedEngine {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn EngineService>> {
        let mode = self.current_mode(endpoint)?;
        self.check(mode, LifecycleStage::Connect)?;
        self.record(EngineEvent::Connected {
            endpoint: endpoint.to_string(),
        })?;
        Ok(Box::new(ScriptedService {
            engine: self.clone(),
            mode,
        }))
    }
}

struct ScriptedProcess {
    engine: ScriptedEngine,
    mode: StartupMode,
    exited: bool,
}

impl ScriptedProcess {
    fn mark_exited(&mut self) -> Result<()> {
        if !self.exited {
            self.exited = true;
            let mut state = self.engine.lock()?;
            state.running = state.running.saturating_sub(1);
        }
        Ok(())
    }
}

#[async_trait]
impl EngineProcess for ScriptedProcess {
    fn endpoint(&self) -> String {
        format!("scripted://engine/{}", self.mode)
    }

    async fn wait(&mut self) -> Result<()> {
        self.mark_exited()?;
        self.engine.check(self.mode, LifecycleStage::Wait)?;
        self.engine.record(EngineEvent::Exited { mode: self.mode })
    }
}

impl Drop for ScriptedProcess {
    fn drop(&mut self) {
        let _ = self.mark_exited();
    }
}

struct ScriptedService {
    engine: ScriptedEngine,
    mode: StartupMode,
}

#[async_trait]
impl EngineService for ScriptedService {
    async fn fix_system_data_after_restore(
        &self,
        last_write_ts: Option<LogTimestamp>,
        need_fix_oplog: bool,
    ) -> Result<()> {
        self.engine.check(self.mode, LifecycleStage::Repair)?;
        self.engine.record(EngineEvent::FixedSystemData {
            last_write_ts,
            need_fix_oplog,
        })
    }

    async fn shutdown(&self) -> Result<()> {
        self.engine.check(self.mode, LifecycleStage::Shutdown)?;
        self.engine.record(EngineEvent::ShutdownRequested)
    }
}
