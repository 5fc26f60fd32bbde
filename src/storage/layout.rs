//! Object naming shared by the backup and restore paths.

/// Folder holding backup sentinels and per-backup data.
pub const BASE_BACKUP_PATH: &str = "basebackups_005/";
/// Folder holding one sub-folder per segment, `seg<contentID>`.
pub const SEGMENTS_PATH: &str = "segments_005/";
pub const SENTINEL_SUFFIX: &str = "_backup_stop_sentinel.json";
pub const METADATA_FILE_NAME: &str = "metadata.json";

pub fn sentinel_name(backup_name: &str) -> String {
    format!("{}{}", backup_name, SENTINEL_SUFFIX)
}

/// Storage prefix a segment with `content_id` writes its backups under.
pub fn segment_storage_prefix(content_id: i32) -> String {
    format!("{}seg{}/", SEGMENTS_PATH, content_id)
}

/// Extracts the backup name from a sentinel object name.
pub fn backup_name_from_sentinel(object_name: &str) -> Option<&str> {
    object_name.strip_suffix(SENTINEL_SUFFIX)
}
