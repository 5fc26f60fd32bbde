pub mod download;
pub mod local;
pub mod policy;
pub mod service;

pub use download::{FolderPayloadDownloader, PayloadDownloader};
pub use local::LocalStorage;
pub use policy::{
    CompatibilityPolicy, CompatibilityVerdict, LogRepairPolicy, MajorMinorPolicy,
    parse_major_minor,
};
pub use service::{RestoreReport, RestoreService, RestoreSession};
