pub mod runner;
pub mod scripted;
pub mod shell;
pub mod ssh;

pub use runner::{
    ClusterCommandRunner, RemoteCommand, RemoteOutput, ShellCommandResult, run_on_all_nodes,
};
pub use scripted::{RemoteCommandHook, ScriptedCommandRunner};
pub use shell::{flag_value, quote_word, split_command_line};
pub use ssh::{SshCommandRunner, SshRunnerConfig};
