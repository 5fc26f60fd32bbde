use super::connection::ControlConnection;
use crate::core::{BackupError, ClusterTopology, Result, RestoreLsnSet};
use std::collections::BTreeMap;
use tracing::info;

/// Creates a cluster-consistent named restore point.
///
/// The call is never retried here: a retry could run against cluster state
/// that changed after a partially created restore point.
pub struct RestorePointCoordinator<'a> {
    connection: &'a dyn ControlConnection,
    topology: &'a ClusterTopology,
}

impl<'a> RestorePointCoordinator<'a> {
    pub fn new(connection: &'a dyn ControlConnection, topology: &'a ClusterTopology) -> Self {
        Self {
            connection,
            topology,
        }
    }

    /// Returns one position per segment of the topology, or an error.
    /// The coordinator (content id -1) is part of the topology, so a result
    /// that only covers the primary segments is rejected.
    pub async fn create_restore_point(&self, name: &str) -> Result<RestoreLsnSet> {
        info!(restore_point = name, "Creating restore point");
        let rows = self
            .connection
            .create_restore_point(name)
            .await
            .map_err(|err| BackupError::RestorePoint {
                name: name.to_string(),
                reason: err.to_string(),
            })?;

        let mut lsns = BTreeMap::new();
        for row in rows {
            if self.topology.by_content(row.content_id).is_none() {
                return Err(BackupError::RestorePoint {
                    name: name.to_string(),
                    reason: format!(
                        "result contains unknown content id {}",
                        row.content_id
                    ),
                });
            }
            if lsns.insert(row.content_id, row.lsn).is_some() {
                return Err(BackupError::RestorePoint {
                    name: name.to_string(),
                    reason: format!("content id {} reported more than once", row.content_id),
                });
            }
        }

        let missing: Vec<String> = self
            .topology
            .content_ids()
            .into_iter()
            .filter(|content_id| !lsns.contains_key(content_id))
            .map(|content_id| content_id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BackupError::RestorePoint {
                name: name.to_string(),
                reason: format!("no position reported for content id(s) {}", missing.join(", ")),
            });
        }

        Ok(RestoreLsnSet::from_map(lsns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::connection::RestorePointRow;
    use crate::core::SegmentDescriptor;
    use async_trait::async_trait;

    struct FixedRows(Vec<RestorePointRow>);

    #[async_trait]
    impl ControlConnection for FixedRows {
        async fn create_restore_point(&self, _name: &str) -> Result<Vec<RestorePointRow>> {
            Ok(self.0.clone())
        }

        async fn engine_version(&self) -> Result<String> {
            Ok("6.25.3".to_string())
        }

        async fn segment_configuration(&self) -> Result<Vec<SegmentDescriptor>> {
            Ok(Vec::new())
        }

        async fn system_identifier(&self) -> Result<Option<u64>> {
            Ok(None)
        }
    }

    struct Rejecting;

    #[async_trait]
    impl ControlConnection for Rejecting {
        async fn create_restore_point(&self, _name: &str) -> Result<Vec<RestorePointRow>> {
            Err(BackupError::Connection("permission denied".to_string()))
        }

        async fn engine_version(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn segment_configuration(&self) -> Result<Vec<SegmentDescriptor>> {
            Ok(Vec::new())
        }

        async fn system_identifier(&self) -> Result<Option<u64>> {
            Ok(None)
        }
    }

    fn topology() -> ClusterTopology {
        ClusterTopology::new(
            (-1..=2)
                .map(|id| SegmentDescriptor::new(id, "sdw", 6000, format!("/data/{}", id)))
                .collect(),
        )
        .unwrap()
    }

    fn rows(ids: &[i32]) -> Vec<RestorePointRow> {
        ids.iter()
            .map(|id| RestorePointRow::new(*id, format!("0/{:X}", 100 + id)))
            .collect()
    }

    #[tokio::test]
    async fn full_result_covers_every_segment() {
        let topology = topology();
        let connection = FixedRows(rows(&[-1, 0, 1, 2]));
        let lsns = RestorePointCoordinator::new(&connection, &topology)
            .create_restore_point("backup_x")
            .await
            .unwrap();
        assert_eq!(lsns.len(), 4);
        assert_eq!(lsns.get(1), Some("0/65"));
    }

    #[tokio::test]
    async fn partial_result_is_rejected() {
        let topology = topology();
        let connection = FixedRows(rows(&[-1, 0, 2]));
        let err = RestorePointCoordinator::new(&connection, &topology)
            .create_restore_point("backup_x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("content id(s) 1"));
    }

    #[tokio::test]
    async fn primaries_without_coordinator_are_rejected() {
        let topology = topology();
        let connection = FixedRows(rows(&[0, 1, 2]));
        let err = RestorePointCoordinator::new(&connection, &topology)
            .create_restore_point("backup_x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("content id(s) -1"));
    }

    #[tokio::test]
    async fn duplicate_and_unknown_rows_are_rejected() {
        let topology = topology();
        let duplicated = FixedRows(rows(&[-1, 0, 1, 1, 2]));
        assert!(
            RestorePointCoordinator::new(&duplicated, &topology)
                .create_restore_point("backup_x")
                .await
                .is_err()
        );
        let unknown = FixedRows(rows(&[-1, 0, 1, 2, 7]));
        assert!(
            RestorePointCoordinator::new(&unknown, &topology)
                .create_restore_point("backup_x")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn rejected_operation_is_a_restore_point_error() {
        let topology = topology();
        let err = RestorePointCoordinator::new(&Rejecting, &topology)
            .create_restore_point("backup_x")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::RestorePoint { .. }));
    }
}
