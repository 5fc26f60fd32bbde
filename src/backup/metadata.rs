use crate::core::{BackupError, Result, SegmentDescriptor, SegmentUserData};
use crate::storage::{
    BASE_BACKUP_PATH, Folder, METADATA_FILE_NAME, backup_name_from_sentinel,
    segment_storage_prefix, sentinel_name,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Extended metadata a segment worker records for one completed backup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentBackupMetadata {
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub data_dir: String,
    #[serde(default)]
    pub engine_version: Option<String>,
    #[serde(default)]
    pub start_lsn: Option<String>,
    #[serde(default)]
    pub finish_lsn: Option<String>,
    #[serde(default)]
    pub is_permanent: bool,
    #[serde(default)]
    pub system_identifier: Option<u64>,
    #[serde(default)]
    pub uncompressed_size: u64,
    #[serde(default)]
    pub compressed_size: u64,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub user_data: Option<serde_json::Value>,
}

/// Sentinel a segment worker writes next to its backup.
///
/// Only the fields needed to locate the backup are modeled; the rest of the
/// document is ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentBackupSentinel {
    #[serde(default)]
    pub user_data: Option<serde_json::Value>,
    #[serde(default)]
    pub finish_lsn: Option<String>,
}

impl SegmentBackupSentinel {
    fn matches(&self, user_data: &SegmentUserData) -> bool {
        self.user_data
            .as_ref()
            .and_then(|value| serde_json::from_value::<SegmentUserData>(value.clone()).ok())
            .is_some_and(|data| data.id == user_data.id)
    }
}

/// Fetches the backup metadata of one segment.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(
        &self,
        user_data: &SegmentUserData,
        segment: &SegmentDescriptor,
    ) -> Result<SegmentBackupMetadata>;
}

/// Finds segment backups in shared storage by the user data they carry.
#[derive(Clone)]
pub struct SegmentBackupLocator {
    root: Arc<dyn Folder>,
}

impl SegmentBackupLocator {
    pub fn new(root: Arc<dyn Folder>) -> Self {
        Self { root }
    }

    /// `segments_005/seg<contentID>/basebackups_005/` under the storage root.
    pub fn base_folder(&self, content_id: i32) -> Arc<dyn Folder> {
        self.root
            .sub_folder(&segment_storage_prefix(content_id))
            .sub_folder(BASE_BACKUP_PATH)
    }

    /// Name of the segment backup tagged with `user_data`.
    pub async fn find_backup_name(
        &self,
        user_data: &SegmentUserData,
        content_id: i32,
    ) -> Result<String> {
        let folder = self.base_folder(content_id);
        let listing = folder.list_folder().await?;
        for object in &listing.objects {
            let Some(backup_name) = backup_name_from_sentinel(object) else {
                continue;
            };
            let bytes = folder.read_object(object).await?;
            let sentinel: SegmentBackupSentinel = serde_json::from_slice(&bytes)?;
            if sentinel.matches(user_data) {
                return Ok(backup_name.to_string());
            }
        }
        Err(BackupError::ObjectNotFound(format!(
            "{}<backup with user data id {}>",
            folder.path(),
            user_data.id
        )))
    }

    pub async fn fetch_metadata(
        &self,
        user_data: &SegmentUserData,
        content_id: i32,
    ) -> Result<SegmentBackupMetadata> {
        let backup_name = self.find_backup_name(user_data, content_id).await?;
        let bytes = self
            .base_folder(content_id)
            .sub_folder(&backup_name)
            .read_object(METADATA_FILE_NAME)
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl MetadataSource for SegmentBackupLocator {
    async fn fetch(
        &self,
        user_data: &SegmentUserData,
        segment: &SegmentDescriptor,
    ) -> Result<SegmentBackupMetadata> {
        self.fetch_metadata(user_data, segment.content_id).await
    }
}

/// Writes a segment backup's metadata and sentinel the way a worker does.
///
/// The sentinel goes last so a listed sentinel always has its metadata.
pub async fn publish_segment_backup(
    root: &dyn Folder,
    content_id: i32,
    backup_name: &str,
    user_data: &SegmentUserData,
    metadata: &SegmentBackupMetadata,
) -> Result<()> {
    let base = root
        .sub_folder(&segment_storage_prefix(content_id))
        .sub_folder(BASE_BACKUP_PATH);
    base.sub_folder(backup_name)
        .put_object(METADATA_FILE_NAME, serde_json::to_vec_pretty(metadata)?)
        .await?;

    let sentinel = SegmentBackupSentinel {
        user_data: Some(serde_json::to_value(user_data)?),
        finish_lsn: metadata.finish_lsn.clone(),
    };
    base.put_object(&sentinel_name(backup_name), serde_json::to_vec(&sentinel)?)
        .await
}
