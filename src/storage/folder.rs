use crate::core::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Objects and sub-folders directly under a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderListing {
    pub objects: Vec<String>,
    pub sub_folders: Vec<String>,
}

/// A hierarchical view over blob storage.
///
/// Every path is relative to the folder; `sub_folder` scopes further without
/// touching the backend.
#[async_trait]
pub trait Folder: Send + Sync {
    /// Path of this folder relative to the storage root, ending in `/` unless empty.
    fn path(&self) -> &str;

    fn sub_folder(&self, relative: &str) -> Arc<dyn Folder>;

    /// Reads an object, failing with `ObjectNotFound` when it is absent.
    async fn read_object(&self, name: &str) -> Result<Vec<u8>>;

    /// Writes an object in one step: readers see either nothing or all of it.
    async fn put_object(&self, name: &str, content: Vec<u8>) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    async fn list_folder(&self) -> Result<FolderListing>;
}

/// Joins folder path components, normalizing slashes.
pub fn join_path(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.trim_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, true) => String::new(),
        (true, false) => format!("{}/", relative),
        (false, true) => format!("{}/", base),
        (false, false) => format!("{}/{}/", base, relative),
    }
}
