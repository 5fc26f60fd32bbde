pub mod cluster_info;
pub mod connection;
pub mod pg;
pub mod restore_point;

pub use cluster_info::{ClusterInfo, parse_engine_version};
pub use connection::{ControlConnection, ControlConnector, RestorePointRow};
pub use pg::{PgControlConnector, PgControlConnection};
pub use restore_point::RestorePointCoordinator;
