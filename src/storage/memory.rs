use super::folder::{Folder, FolderListing, join_path};
use crate::core::{BackupError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, Vec<u8>>,
    /// Remaining injected failures for listings of folders containing the key.
    listing_failures: BTreeMap<String, u32>,
    reads: u64,
    writes: u64,
    listings: u64,
}

/// Counters of backend calls made through a [`MemoryFolder`] tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryFolderStats {
    pub reads: u64,
    pub writes: u64,
    pub listings: u64,
}

/// In-memory storage backend shared by every sub-folder created from it.
#[derive(Debug, Clone, Default)]
pub struct MemoryFolder {
    path: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFolder {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|err| BackupError::Storage(format!("memory folder lock poisoned: {}", err)))
    }

    fn full_key(&self, name: &str) -> String {
        format!("{}{}", self.path, name.trim_start_matches('/'))
    }

    /// Makes the next `times` listings of any folder whose path contains
    /// `path_fragment` fail with a transient storage error.
    pub fn fail_listings(&self, path_fragment: impl Into<String>, times: u32) -> Result<()> {
        let mut state = self.state()?;
        state.listing_failures.insert(path_fragment.into(), times);
        Ok(())
    }

    /// Every object key below this folder, relative to the storage root.
    pub fn keys(&self) -> Result<Vec<String>> {
        let state = self.state()?;
        Ok(state
            .objects
            .keys()
            .filter(|key| key.starts_with(self.path.as_str()))
            .cloned()
            .collect())
    }

    pub fn stats(&self) -> Result<MemoryFolderStats> {
        let state = self.state()?;
        Ok(MemoryFolderStats {
            reads: state.reads,
            writes: state.writes,
            listings: state.listings,
        })
    }
}

#[async_trait]
impl Folder for MemoryFolder {
    fn path(&self) -> &str {
        &self.path
    }

    fn sub_folder(&self, relative: &str) -> Arc<dyn Folder> {
        Arc::new(MemoryFolder {
            path: join_path(&self.path, relative),
            state: self.state.clone(),
        })
    }

    async fn read_object(&self, name: &str) -> Result<Vec<u8>> {
        let key = self.full_key(name);
        let mut state = self.state()?;
        state.reads += 1;
        state
            .objects
            .get(&key)
            .cloned()
            .ok_or(BackupError::ObjectNotFound(key))
    }

    async fn put_object(&self, name: &str, content: Vec<u8>) -> Result<()> {
        let key = self.full_key(name);
        let mut state = self.state()?;
        state.writes += 1;
        state.objects.insert(key, content);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let key = self.full_key(name);
        let state = self.state()?;
        Ok(state.objects.contains_key(&key))
    }

    async fn list_folder(&self) -> Result<FolderListing> {
        let mut state = self.state()?;
        state.listings += 1;

        let path = self.path.clone();
        if let Some(remaining) = state
            .listing_failures
            .iter_mut()
            .find(|(fragment, remaining)| path.contains(fragment.as_str()) && **remaining > 0)
            .map(|(_, remaining)| remaining)
        {
            *remaining -= 1;
            return Err(BackupError::Storage(format!(
                "listing '{}' was throttled",
                path
            )));
        }

        let mut objects = Vec::new();
        let mut sub_folders = BTreeSet::new();
        for key in state.objects.keys() {
            let Some(rest) = key.strip_prefix(path.as_str()) else {
                continue;
            };
            match rest.split_once('/') {
                Some((folder, _)) => {
                    sub_folders.insert(folder.to_string());
                }
                None => objects.push(rest.to_string()),
            }
        }
        Ok(FolderListing {
            objects,
            sub_folders: sub_folders.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sub_folders_share_one_backend() {
        let root = MemoryFolder::new();
        let base = root.sub_folder("basebackups_005");
        base.put_object("b1.json", b"{}".to_vec()).await.unwrap();

        assert_eq!(root.keys().unwrap(), vec!["basebackups_005/b1.json".to_string()]);
        assert_eq!(
            root.read_object("basebackups_005/b1.json").await.unwrap(),
            b"{}".to_vec()
        );
        assert!(base.read_object("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn listing_splits_objects_and_folders() {
        let root = MemoryFolder::new();
        root.put_object("a/x.json", Vec::new()).await.unwrap();
        root.put_object("a/b/y.json", Vec::new()).await.unwrap();
        let listing = root.sub_folder("a").list_folder().await.unwrap();
        assert_eq!(listing.objects, vec!["x.json".to_string()]);
        assert_eq!(listing.sub_folders, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn injected_listing_failures_are_consumed() {
        let root = MemoryFolder::new();
        root.fail_listings("seg1", 2).unwrap();
        let seg1 = root.sub_folder("segments_005/seg1");
        assert!(seg1.list_folder().await.is_err());
        assert!(seg1.list_folder().await.is_err());
        assert!(seg1.list_folder().await.is_ok());
        assert!(root.sub_folder("segments_005/seg0").list_folder().await.is_ok());
        assert_eq!(root.stats().unwrap().listings, 4);
    }
}
