use super::folder::{Folder, FolderListing, join_path};
use crate::core::{BackupError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

const STAGING_SUFFIX: &str = ".partial";

/// Storage backend rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsFolder {
    root: PathBuf,
    path: String,
}

impl FsFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            path: String::new(),
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = format!("{}{}", self.path, name.trim_start_matches('/'));
        if relative.split('/').any(|part| part == "..") {
            return Err(BackupError::Storage(format!(
                "object path '{}' escapes the storage root",
                relative
            )));
        }
        Ok(self.root.join(relative))
    }
}

/// Hidden sibling `.<name>.<uuid>.partial` that a write is staged in.
fn staging_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| {
            BackupError::Storage(format!("object path '{}' has no file name", path.display()))
        })?
        .to_string_lossy();
    Ok(path.with_file_name(format!(".{}.{}{}", name, Uuid::new_v4(), STAGING_SUFFIX)))
}

fn is_staging_name(name: &str) -> bool {
    let Some(inner) = name
        .strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(STAGING_SUFFIX))
    else {
        return false;
    };
    inner
        .rsplit_once('.')
        .is_some_and(|(object, id)| !object.is_empty() && Uuid::parse_str(id).is_ok())
}

async fn write_staged(temp_path: &Path, content: &[u8]) -> Result<()> {
    let mut file = fs::File::create(temp_path).await.map_err(|err| {
        BackupError::Storage(format!(
            "failed to create temp file '{}': {}",
            temp_path.display(),
            err
        ))
    })?;
    file.write_all(content).await?;
    file.sync_all().await?;
    Ok(())
}

#[async_trait]
impl Folder for FsFolder {
    fn path(&self) -> &str {
        &self.path
    }

    fn sub_folder(&self, relative: &str) -> Arc<dyn Folder> {
        Arc::new(FsFolder {
            root: self.root.clone(),
            path: join_path(&self.path, relative),
        })
    }

    async fn read_object(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(BackupError::ObjectNotFound(
                path.to_string_lossy().to_string(),
            )),
            Err(err) => Err(BackupError::Storage(format!(
                "failed to read '{}': {}",
                path.display(),
                err
            ))),
        }
    }

    async fn put_object(&self, name: &str, content: Vec<u8>) -> Result<()> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|err| {
                BackupError::Storage(format!(
                    "failed to create directory '{}': {}",
                    parent.display(),
                    err
                ))
            })?;
        }

        let temp_path = staging_path(&path)?;
        let staged = match write_staged(&temp_path, &content).await {
            Ok(()) => fs::rename(&temp_path, &path).await.map_err(|err| {
                BackupError::Storage(format!("failed to rename '{}': {}", path.display(), err))
            }),
            Err(err) => Err(err),
        };
        if staged.is_err() {
            if let Err(remove_err) = fs::remove_file(&temp_path).await {
                if remove_err.kind() != ErrorKind::NotFound {
                    warn!(path = %temp_path.display(), error = %remove_err, "failed to remove staged write");
                }
            }
        }
        staged
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn list_folder(&self) -> Result<FolderListing> {
        let dir = self.root.join(&self.path);
        let mut listing = FolderListing::default();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(listing),
            Err(err) => {
                return Err(BackupError::Storage(format!(
                    "failed to list '{}': {}",
                    dir.display(),
                    err
                )));
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_dir() {
                listing.sub_folders.push(name);
            } else if !is_staging_name(&name) {
                listing.objects.push(name);
            }
        }
        listing.objects.sort();
        listing.sub_folders.sort();
        Ok(listing)
    }
}
