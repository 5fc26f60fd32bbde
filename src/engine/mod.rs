pub mod mongod;
pub mod pass;
pub mod process;
pub mod scripted;

pub use mongod::{EngineLaunchConfig, MongodLauncher, MongodProcess};
pub use pass::{RepairAction, RestrictedPass};
pub use process::{EngineConnector, EngineLauncher, EngineProcess, EngineService, StartupMode};
pub use scripted::{EngineEvent, ScriptedEngine};
