use crate::cluster::quote_word;
use crate::config::BackupConfig;
use crate::core::{Result, SegmentDescriptor, SegmentFwdArg, SegmentUserData};

/// Flag carrying the segment's storage prefix (its content id).
pub const STORAGE_PREFIX_FLAG: &str = "storage-prefix";
/// Flag carrying the quoted segment user data.
pub const USER_DATA_FLAG: &str = "add-user-data";
/// Flag carrying the forwarded configuration path.
pub const CONFIG_FLAG: &str = "config";

/// Builds the single-line invocation run on every segment.
///
/// ```text
/// PGPORT=<port> <worker> <sub-command> <data dir> --storage-prefix=<id>
///     --add-user-data=<quoted json> [--config=<path>] [--<name>=<value>...]
/// ```
pub struct SegmentCommandBuilder<'a> {
    config: &'a BackupConfig,
    fwd_args: &'a [SegmentFwdArg],
}

impl<'a> SegmentCommandBuilder<'a> {
    pub fn new(config: &'a BackupConfig, fwd_args: &'a [SegmentFwdArg]) -> Self {
        Self { config, fwd_args }
    }

    pub fn build(&self, segment: &SegmentDescriptor, user_data: &SegmentUserData) -> Result<String> {
        let mut cmd = vec![
            format!("{}={}", self.config.port_env_var, segment.port),
            quote_word(&self.config.worker_binary),
            self.config.segment_subcommand.clone(),
            quote_word(&segment.data_dir),
            format!("--{}={}", STORAGE_PREFIX_FLAG, segment.content_id),
            format!("--{}={}", USER_DATA_FLAG, user_data.quoted_string()?),
        ];
        if let Some(path) = &self.config.forwarded_config_path {
            cmd.push(format!("--{}={}", CONFIG_FLAG, quote_word(path)));
        }
        for arg in self.config.forwarded_args.iter().chain(self.fwd_args) {
            cmd.push(format!("--{}={}", arg.name, quote_word(&arg.value)));
        }
        Ok(cmd.join(" "))
    }
}
