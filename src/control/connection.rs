use crate::core::{Result, SegmentDescriptor};
use async_trait::async_trait;

/// One row of the cluster's "create named restore point" result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePointRow {
    pub content_id: i32,
    pub lsn: String,
}

impl RestorePointRow {
    pub fn new(content_id: i32, lsn: impl Into<String>) -> Self {
        Self {
            content_id,
            lsn: lsn.into(),
        }
    }
}

/// Request/response control channel to the coordinator node.
#[async_trait]
pub trait ControlConnection: Send + Sync {
    /// Issues the cluster-wide named restore point and returns its raw rows.
    async fn create_restore_point(&self, name: &str) -> Result<Vec<RestorePointRow>>;

    /// The engine's full version banner.
    async fn engine_version(&self) -> Result<String>;

    /// Primary segments of the cluster, coordinator included.
    async fn segment_configuration(&self) -> Result<Vec<SegmentDescriptor>>;

    async fn system_identifier(&self) -> Result<Option<u64>>;
}

/// Opens fresh control connections.
#[async_trait]
pub trait ControlConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ControlConnection>>;
}
