use super::connection::ControlConnector;
use crate::core::{BackupError, ClusterTopology, Result};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

const GREENPLUM_BANNER_MARKER: &str = "(Greenplum Database ";

lazy_static! {
    static ref THREE_PART_VERSION: Regex = Regex::new(r"\d+\.\d+\.\d+").unwrap();
    static ref ANY_VERSION: Regex = Regex::new(r"\d+\.\d+(\.\d+)?").unwrap();
}

/// Cluster facts read once through a temporary control connection.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub topology: ClusterTopology,
    pub engine_version: String,
    pub system_identifier: Option<u64>,
}

impl ClusterInfo {
    pub async fn discover(connector: &dyn ControlConnector) -> Result<Self> {
        info!("Initializing tmp connection to read cluster info");
        let connection = connector.connect().await?;

        let banner = connection.engine_version().await?;
        info!(banner = %banner, "Engine version");
        let engine_version = parse_engine_version(&banner)?;

        let topology = ClusterTopology::new(connection.segment_configuration().await?)?;
        let system_identifier = connection.system_identifier().await?;

        Ok(Self {
            topology,
            engine_version,
            system_identifier,
        })
    }
}

/// Extracts a dotted version from an engine banner.
///
/// Greenplum banners (`"PostgreSQL 9.4.26 (Greenplum Database 6.25.3 build ...)"`)
/// yield the three-part Greenplum version; other banners yield the first
/// dotted number found.
pub fn parse_engine_version(banner: &str) -> Result<String> {
    if let Some(start) = banner.find(GREENPLUM_BANNER_MARKER) {
        let rest = &banner[start + GREENPLUM_BANNER_MARKER.len()..];
        let inner = rest.split(')').next().unwrap_or(rest);
        return THREE_PART_VERSION
            .find(inner)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                BackupError::Config(format!("No match found in '{}'", inner))
            });
    }
    ANY_VERSION
        .find(banner)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| BackupError::Config(format!("No match found in '{}'", banner)))
}
