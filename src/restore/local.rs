use crate::core::{BackupError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// The destination data directory of a single-node restore.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    data_dir: PathBuf,
    lock_file: PathBuf,
}

impl LocalStorage {
    pub fn new(data_dir: impl Into<PathBuf>, lock_file_name: &str) -> Self {
        let data_dir = data_dir.into();
        let lock_file = data_dir.join(lock_file_name);
        Self {
            data_dir,
            lock_file,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Fails when the lock marker has content, i.e. an engine may be running
    /// on this data directory.
    pub async fn ensure_lock_file_is_empty(&self) -> Result<()> {
        match fs::metadata(&self.lock_file).await {
            Ok(meta) if meta.len() > 0 => Err(BackupError::Precondition(format!(
                "lock file '{}' is not empty, is the engine still running?",
                self.lock_file.display()
            ))),
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BackupError::Precondition(format!(
                "cannot inspect lock file '{}': {}",
                self.lock_file.display(),
                err
            ))),
        }
    }

    /// Removes everything inside the data directory, creating it if missing.
    pub async fn cleanup_data_dir(&self) -> Result<()> {
        info!(data_dir = %self.data_dir.display(), "Cleaning up data directory");
        let precondition = |err: std::io::Error| {
            BackupError::Precondition(format!(
                "cannot clean data directory '{}': {}",
                self.data_dir.display(),
                err
            ))
        };

        fs::create_dir_all(&self.data_dir).await.map_err(precondition)?;
        let mut entries = fs::read_dir(&self.data_dir).await.map_err(precondition)?;
        while let Some(entry) = entries.next_entry().await.map_err(precondition)? {
            let path = entry.path();
            if entry.file_type().await.map_err(precondition)?.is_dir() {
                fs::remove_dir_all(&path).await.map_err(precondition)?;
            } else {
                fs::remove_file(&path).await.map_err(precondition)?;
            }
        }
        Ok(())
    }
}
