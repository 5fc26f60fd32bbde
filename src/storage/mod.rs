pub mod folder;
pub mod fs;
pub mod layout;
pub mod memory;

pub use folder::{Folder, FolderListing, join_path};
pub use fs::FsFolder;
pub use layout::{
    BASE_BACKUP_PATH, METADATA_FILE_NAME, SEGMENTS_PATH, SENTINEL_SUFFIX,
    backup_name_from_sentinel, segment_storage_prefix, sentinel_name,
};
pub use memory::{MemoryFolder, MemoryFolderStats};
