pub mod aggregator;
pub mod command;
pub mod handler;
pub mod metadata;
pub mod naming;
pub mod sentinel;

pub use aggregator::SegmentMetadataAggregator;
pub use command::{CONFIG_FLAG, STORAGE_PREFIX_FLAG, SegmentCommandBuilder, USER_DATA_FLAG};
pub use handler::{BackupArguments, BackupHandler, BackupWorkers};
pub use metadata::{
    MetadataSource, SegmentBackupLocator, SegmentBackupMetadata, SegmentBackupSentinel,
    publish_segment_backup,
};
pub use naming::{
    BACKUP_NAME_LENGTH, BACKUP_NAME_PREFIX, BACKUP_TIME_FORMAT, format_backup_name,
    is_backup_name,
};
pub use sentinel::{
    BackupSentinel, CurrentBackupInfo, LogTimestamp, SENTINEL_FORMAT_VERSION, SentinelUserData,
    download_sentinel, upload_sentinel,
};
