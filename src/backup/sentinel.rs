use super::metadata::SegmentBackupMetadata;
use crate::core::{
    BackupError, ClusterTopology, Result, RestoreLsnSet, SegmentDescriptor, SegmentUserData,
};
use crate::storage::{BASE_BACKUP_PATH, Folder, sentinel_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Version of the sentinel document layout. New fields are always optional.
pub const SENTINEL_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    SENTINEL_FORMAT_VERSION
}

/// Caller-supplied annotation stored in the sentinel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentinelUserData {
    pub schema_version: u32,
    pub payload: serde_json::Value,
}

impl SentinelUserData {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            schema_version: 1,
            payload,
        }
    }
}

/// Position in the engine's operation log: seconds plus an ordinal within the second.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogTimestamp {
    pub ts: u32,
    pub inc: u32,
}

/// The durable record of one completed backup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupSentinel {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub backup_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub system_identifier: Option<u64>,
    pub engine_version: String,
    /// Segment configuration keyed by the segment's user data id.
    #[serde(default)]
    pub segments: BTreeMap<String, SegmentDescriptor>,
    #[serde(default)]
    pub restore_lsns: RestoreLsnSet,
    /// Segment backup metadata keyed by the segment's user data id.
    #[serde(default)]
    pub segments_metadata: BTreeMap<String, SegmentBackupMetadata>,
    #[serde(default)]
    pub user_data: Option<SentinelUserData>,
    #[serde(default)]
    pub is_permanent: bool,
    #[serde(default)]
    pub uncompressed_size: u64,
    #[serde(default)]
    pub compressed_size: u64,
    /// Last write applied before the backup finished, for single-node restores.
    #[serde(default)]
    pub last_write_ts: Option<LogTimestamp>,
}

/// State a backup run accumulates before the sentinel can be built.
#[derive(Debug, Clone)]
pub struct CurrentBackupInfo {
    pub backup_name: String,
    pub start_time: DateTime<Utc>,
    pub system_identifier: Option<u64>,
    pub engine_version: String,
    /// Whether the coordinator was expected among the segment backups.
    pub include_coordinator: bool,
    /// Dispatched segment backups, in dispatch order.
    pub segment_backups: Vec<(SegmentUserData, SegmentDescriptor)>,
    pub segments_metadata: BTreeMap<String, SegmentBackupMetadata>,
}

impl BackupSentinel {
    /// Builds the sentinel, requiring that every content id of `topology`
    /// appears exactly once among the restore point positions and that every
    /// targeted segment was dispatched once and has collected metadata.
    pub fn assemble(
        topology: &ClusterTopology,
        info: CurrentBackupInfo,
        restore_lsns: RestoreLsnSet,
        user_data: Option<SentinelUserData>,
        is_permanent: bool,
    ) -> Result<Self> {
        let incomplete = |reason: String| BackupError::IncompleteSentinel {
            backup_name: info.backup_name.clone(),
            reason,
        };

        if info.engine_version.is_empty() {
            return Err(incomplete("engine version is unknown".to_string()));
        }

        let mut dispatched = HashSet::new();
        for (user_data, segment) in &info.segment_backups {
            if !dispatched.insert(segment.content_id) {
                return Err(incomplete(format!(
                    "content id {} was dispatched more than once",
                    segment.content_id
                )));
            }
            if !info.segments_metadata.contains_key(&user_data.id) {
                return Err(incomplete(format!(
                    "no metadata for segment {} (backup id {})",
                    segment.content_id, user_data.id
                )));
            }
        }
        if info.segments_metadata.len() != info.segment_backups.len() {
            return Err(incomplete(format!(
                "{} metadata entries for {} segment backups",
                info.segments_metadata.len(),
                info.segment_backups.len()
            )));
        }

        for segment in topology.targets(info.include_coordinator) {
            if !dispatched.contains(&segment.content_id) {
                return Err(incomplete(format!(
                    "segment {} was never backed up",
                    segment.content_id
                )));
            }
        }
        for content_id in topology.content_ids() {
            if restore_lsns.get(content_id).is_none() {
                return Err(incomplete(format!(
                    "no restore point position for segment {}",
                    content_id
                )));
            }
        }
        if restore_lsns.len() != topology.len() {
            return Err(incomplete(format!(
                "{} restore point positions for {} segments",
                restore_lsns.len(),
                topology.len()
            )));
        }

        let uncompressed_size = info
            .segments_metadata
            .values()
            .map(|meta| meta.uncompressed_size)
            .sum();
        let compressed_size = info
            .segments_metadata
            .values()
            .map(|meta| meta.compressed_size)
            .sum();
        let finish_time = info
            .segments_metadata
            .values()
            .map(|meta| meta.finish_time)
            .max();
        let segments = info
            .segment_backups
            .into_iter()
            .map(|(user_data, segment)| (user_data.id, segment))
            .collect();

        Ok(Self {
            format_version: SENTINEL_FORMAT_VERSION,
            backup_name: info.backup_name,
            start_time: info.start_time,
            finish_time,
            system_identifier: info.system_identifier,
            engine_version: info.engine_version,
            segments,
            restore_lsns,
            segments_metadata: info.segments_metadata,
            user_data,
            is_permanent,
            uncompressed_size,
            compressed_size,
            last_write_ts: None,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Writes the sentinel under `basebackups_005/`.
pub async fn upload_sentinel(root: &dyn Folder, sentinel: &BackupSentinel) -> Result<()> {
    info!(backup_name = %sentinel.backup_name, "Uploading sentinel file");
    let body = serde_json::to_vec_pretty(sentinel)?;
    root.sub_folder(BASE_BACKUP_PATH)
        .put_object(&sentinel_name(&sentinel.backup_name), body)
        .await
}

/// Reads the sentinel of `backup_name`, failing with `BackupNotFound` if absent.
pub async fn download_sentinel(root: &dyn Folder, backup_name: &str) -> Result<BackupSentinel> {
    let bytes = root
        .sub_folder(BASE_BACKUP_PATH)
        .read_object(&sentinel_name(backup_name))
        .await
        .map_err(|err| match err {
            BackupError::ObjectNotFound(_) => BackupError::BackupNotFound(backup_name.to_string()),
            other => other,
        })?;
    Ok(serde_json::from_slice(&bytes)?)
}
