pub mod deadline;
pub mod error;
pub mod types;

pub use deadline::with_deadline;
pub use error::{BackupError, LifecycleStage, NodeFailure, RepairPass, Result};
pub use types::{
    COORDINATOR_CONTENT_ID, ClusterTopology, RestoreLsnSet, SegmentDescriptor, SegmentFwdArg,
    SegmentUserData,
};
