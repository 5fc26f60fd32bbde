#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use clusterbackup::backup::{SegmentBackupMetadata, publish_segment_backup};
use clusterbackup::cluster::{
    RemoteCommand, RemoteCommandHook, ScriptedCommandRunner, flag_value, split_command_line,
};
use clusterbackup::control::{ControlConnection, ControlConnector, RestorePointRow};
use clusterbackup::core::{BackupError, Result, SegmentDescriptor, SegmentUserData};
use clusterbackup::storage::MemoryFolder;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const GREENPLUM_BANNER: &str = "PostgreSQL 9.4.26 (Greenplum Database 6.25.3 build commit:367edc6b4dfd909fe38fc288ade9e294d74e3f9a) on x86_64-unknown-linux-gnu";

/// Coordinator plus primaries `0..segments`.
pub fn cluster_segments(segments: i32) -> Vec<SegmentDescriptor> {
    let mut all = vec![SegmentDescriptor::new(-1, "mdw", 5432, "/data/coordinator/gpseg-1")];
    for content_id in 0..segments {
        all.push(SegmentDescriptor::new(
            content_id,
            format!("sdw{}", content_id + 1),
            6000 + content_id as u16,
            format!("/data/primary/gpseg{}", content_id),
        ));
    }
    all
}

#[derive(Clone)]
pub enum RestorePointScript {
    /// `lsn<content id>` for every segment.
    Complete,
    /// Omits the listed content ids from the result.
    Missing(Vec<i32>),
    Rejected(String),
}

/// Control connection double answering from fixed data.
#[derive(Clone)]
pub struct FakeControl {
    pub segments: Vec<SegmentDescriptor>,
    pub banner: String,
    pub restore_point: RestorePointScript,
    pub connects: Arc<AtomicUsize>,
    pub restore_points: Arc<Mutex<Vec<String>>>,
}

impl FakeControl {
    pub fn new(segments: Vec<SegmentDescriptor>) -> Self {
        Self {
            segments,
            banner: GREENPLUM_BANNER.to_string(),
            restore_point: RestorePointScript::Complete,
            connects: Arc::new(AtomicUsize::new(0)),
            restore_points: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_restore_point(mut self, script: RestorePointScript) -> Self {
        self.restore_point = script;
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn restore_point_names(&self) -> Vec<String> {
        self.restore_points.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlConnector for FakeControl {
    async fn connect(&self) -> Result<Box<dyn ControlConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl ControlConnection for FakeControl {
    async fn create_restore_point(&self, name: &str) -> Result<Vec<RestorePointRow>> {
        self.restore_points.lock().unwrap().push(name.to_string());
        let rows = |skip: &[i32]| -> Vec<RestorePointRow> {
            self.segments
                .iter()
                .filter(|segment| !skip.contains(&segment.content_id))
                .map(|segment| {
                    RestorePointRow::new(segment.content_id, format!("lsn{}", segment.content_id))
                })
                .collect()
        };
        match &self.restore_point {
            RestorePointScript::Complete => Ok(rows(&[])),
            RestorePointScript::Missing(skip) => Ok(rows(skip)),
            RestorePointScript::Rejected(reason) => Err(BackupError::Connection(reason.clone())),
        }
    }

    async fn engine_version(&self) -> Result<String> {
        Ok(self.banner.clone())
    }

    async fn segment_configuration(&self) -> Result<Vec<SegmentDescriptor>> {
        Ok(self.segments.clone())
    }

    async fn system_identifier(&self) -> Result<Option<u64>> {
        Ok(Some(7_311_826_312_885_441_903))
    }
}

pub fn segment_metadata(content_id: i32) -> SegmentBackupMetadata {
    SegmentBackupMetadata {
        start_time: Utc::now(),
        finish_time: Utc::now(),
        hostname: format!("sdw{}", content_id + 1),
        data_dir: format!("/data/primary/gpseg{}", content_id),
        engine_version: Some("9.4.26".to_string()),
        start_lsn: Some(format!("0/{}000028", content_id + 2)),
        finish_lsn: Some(format!("0/{}0000F8", content_id + 2)),
        is_permanent: false,
        system_identifier: None,
        uncompressed_size: 1024,
        compressed_size: 256,
        file_count: 42,
        user_data: None,
    }
}

/// Plays the remote worker: decodes the invocation the way a shell would and
/// publishes a segment backup tagged with the received user data.
pub fn worker_hook(root: MemoryFolder) -> RemoteCommandHook {
    Arc::new(move |command: RemoteCommand| {
        let root = root.clone();
        async move {
            let words = split_command_line(&command.command).unwrap();
            let content_id: i32 = flag_value(&words, "storage-prefix").unwrap().parse().unwrap();
            let user_data =
                SegmentUserData::from_json(flag_value(&words, "add-user-data").unwrap()).unwrap();
            publish_segment_backup(
                &root,
                content_id,
                &format!("base_00000001000000000000000{}", content_id + 2),
                &user_data,
                &segment_metadata(content_id),
            )
            .await
            .unwrap();
        }
        .boxed()
    })
}

pub fn scripted_cluster(root: &MemoryFolder) -> ScriptedCommandRunner {
    ScriptedCommandRunner::new().with_hook(worker_hook(root.clone()))
}
