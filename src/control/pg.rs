use super::connection::{ControlConnection, ControlConnector, RestorePointRow};
use crate::core::{BackupError, Result, SegmentDescriptor};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

const CREATE_RESTORE_POINT_SQL: &str =
    "SELECT r.segment_id::int4, r.restore_lsn::text FROM gp_create_restore_point($1) AS r";
const VERSION_SQL: &str = "SELECT version()";
const SEGMENT_CONFIGURATION_SQL: &str = "SELECT dbid::int4, content::int4, role::text, port::int4, \
     hostname::text, datadir::text FROM gp_segment_configuration WHERE role = 'p' ORDER BY content";
const SYSTEM_IDENTIFIER_SQL: &str = "SELECT system_identifier::text FROM pg_control_system()";

/// Connects to the coordinator over the PostgreSQL wire protocol.
#[derive(Debug, Clone)]
pub struct PgControlConnector {
    connection_string: String,
}

impl PgControlConnector {
    /// `connection_string` uses libpq key/value or URL syntax.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[async_trait]
impl ControlConnector for PgControlConnector {
    async fn connect(&self) -> Result<Box<dyn ControlConnection>> {
        info!("Connecting to the cluster coordinator");
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls)
            .await
            .map_err(|err| {
                BackupError::Connection(format!("failed to connect to coordinator: {}", err))
            })?;
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "coordinator connection closed with error");
            }
        });
        Ok(Box::new(PgControlConnection { client, driver }))
    }
}

pub struct PgControlConnection {
    client: Client,
    driver: JoinHandle<()>,
}

impl Drop for PgControlConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl ControlConnection for PgControlConnection {
    async fn create_restore_point(&self, name: &str) -> Result<Vec<RestorePointRow>> {
        let rows = self.client.query(CREATE_RESTORE_POINT_SQL, &[&name]).await?;
        rows.iter()
            .map(|row| -> Result<RestorePointRow> {
                Ok(RestorePointRow {
                    content_id: row.try_get::<_, i32>(0)?,
                    lsn: row.try_get::<_, String>(1)?,
                })
            })
            .collect()
    }

    async fn engine_version(&self) -> Result<String> {
        let row = self.client.query_one(VERSION_SQL, &[]).await?;
        Ok(row.try_get::<_, String>(0)?)
    }

    async fn segment_configuration(&self) -> Result<Vec<SegmentDescriptor>> {
        let rows = self.client.query(SEGMENT_CONFIGURATION_SQL, &[]).await?;
        let mut segments = Vec::with_capacity(rows.len());
        for row in rows {
            let port = row.try_get::<_, i32>(3)?;
            segments.push(SegmentDescriptor {
                db_id: row.try_get::<_, i32>(0)?,
                content_id: row.try_get::<_, i32>(1)?,
                role: row.try_get::<_, String>(2)?,
                port: u16::try_from(port).map_err(|_| {
                    BackupError::Config(format!("segment port {} is out of range", port))
                })?,
                hostname: row.try_get::<_, String>(4)?,
                data_dir: row.try_get::<_, String>(5)?,
            });
        }
        Ok(segments)
    }

    async fn system_identifier(&self) -> Result<Option<u64>> {
        let row = self.client.query_opt(SYSTEM_IDENTIFIER_SQL, &[]).await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let raw = row.try_get::<_, Option<String>>(0)?;
        raw.map(|value| {
            value.parse::<u64>().map_err(|err| {
                BackupError::Config(format!("invalid system identifier '{}': {}", value, err))
            })
        })
        .transpose()
    }
}
