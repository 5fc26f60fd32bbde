use crate::core::{BackupError, Result};
use crate::storage::{BASE_BACKUP_PATH, Folder};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Stages the payload of a backup into a data directory.
#[async_trait]
pub trait PayloadDownloader: Send + Sync {
    async fn download(&self, backup_name: &str, data_dir: &Path) -> Result<()>;
}

/// Copies every object under `basebackups_005/<backup>/` into the data
/// directory, keeping the relative paths.
pub struct FolderPayloadDownloader {
    root: Arc<dyn Folder>,
}

impl FolderPayloadDownloader {
    pub fn new(root: Arc<dyn Folder>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl PayloadDownloader for FolderPayloadDownloader {
    async fn download(&self, backup_name: &str, data_dir: &Path) -> Result<()> {
        let backup = self.root.sub_folder(BASE_BACKUP_PATH).sub_folder(backup_name);
        let mut pending = vec![(backup, String::new())];
        let mut copied = 0usize;

        while let Some((folder, relative)) = pending.pop() {
            let listing = folder.list_folder().await?;
            let target_dir = data_dir.join(&relative);
            fs::create_dir_all(&target_dir).await.map_err(|err| {
                BackupError::Staging(format!(
                    "cannot create '{}': {}",
                    target_dir.display(),
                    err
                ))
            })?;

            for object in &listing.objects {
                let bytes = folder.read_object(object).await?;
                let target = target_dir.join(object);
                debug!(file = %target.display(), bytes = bytes.len(), "staging file");
                fs::write(&target, bytes).await.map_err(|err| {
                    BackupError::Staging(format!("cannot write '{}': {}", target.display(), err))
                })?;
                copied += 1;
            }
            for sub_folder in &listing.sub_folders {
                pending.push((
                    folder.sub_folder(sub_folder),
                    format!("{}{}/", relative, sub_folder),
                ));
            }
        }

        if copied == 0 {
            return Err(BackupError::Staging(format!(
                "backup {} has no payload objects",
                backup_name
            )));
        }
        info!(files = copied, "Backup payload staged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryFolder;
    use tempfile::tempdir;

    #[tokio::test]
    async fn nested_objects_land_under_the_data_dir() {
        let root = MemoryFolder::new();
        let backup = root.sub_folder("basebackups_005/stream_1");
        backup.put_object("WiredTiger", b"wt".to_vec()).await.unwrap();
        backup
            .sub_folder("journal")
            .put_object("WiredTigerLog.1", b"log".to_vec())
            .await
            .unwrap();

        let dir = tempdir().unwrap();
        FolderPayloadDownloader::new(Arc::new(root))
            .download("stream_1", dir.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(dir.path().join("WiredTiger")).unwrap(), b"wt");
        assert_eq!(
            std::fs::read(dir.path().join("journal/WiredTigerLog.1")).unwrap(),
            b"log"
        );
    }

    #[tokio::test]
    async fn empty_backup_is_a_staging_error() {
        let dir = tempdir().unwrap();
        let err = FolderPayloadDownloader::new(Arc::new(MemoryFolder::new()))
            .download("missing", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Staging(_)));
    }
}
