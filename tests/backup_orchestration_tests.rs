mod common;

use async_trait::async_trait;
use clusterbackup::backup::{
    BackupArguments, BackupHandler, BackupWorkers, SentinelUserData, download_sentinel,
    is_backup_name,
};
use clusterbackup::cluster::{RemoteCommand, flag_value, split_command_line};
use clusterbackup::config::BackupConfig;
use clusterbackup::core::{BackupError, Result, SegmentFwdArg, SegmentUserData};
use clusterbackup::retry::RecordingSleepDriver;
use clusterbackup::storage::{Folder, FolderListing, MemoryFolder};
use common::{FakeControl, RestorePointScript, cluster_segments, scripted_cluster};
use futures::FutureExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    root: MemoryFolder,
    runner: clusterbackup::ScriptedCommandRunner,
    control: FakeControl,
    sleeper: RecordingSleepDriver,
}

impl Fixture {
    fn new() -> Self {
        let root = MemoryFolder::new();
        Self {
            runner: scripted_cluster(&root),
            root,
            control: FakeControl::new(cluster_segments(3)),
            sleeper: RecordingSleepDriver::new(),
        }
    }

    fn workers(&self) -> BackupWorkers {
        self.workers_with_folder(Arc::new(self.root.clone()))
    }

    fn workers_with_folder(&self, folder: Arc<dyn Folder>) -> BackupWorkers {
        BackupWorkers::new(
            folder,
            Arc::new(self.runner.clone()),
            Arc::new(self.control.clone()),
        )
        .with_sleep_driver(Arc::new(self.sleeper.clone()))
    }

    async fn handler(&self, arguments: BackupArguments, config: BackupConfig) -> BackupHandler {
        BackupHandler::new(arguments, self.workers(), config)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn successful_backup_covers_every_segment() {
    let fixture = Fixture::new();
    let arguments = BackupArguments::new(
        true,
        Some(SentinelUserData::new(json!({"ticket": "OPS-1"}))),
        Vec::new(),
    );
    let handler = fixture.handler(arguments, BackupConfig::new()).await;
    assert_eq!(handler.cluster().engine_version, "6.25.3");

    let sentinel = handler.handle_backup_push().await.unwrap();

    assert!(is_backup_name(&sentinel.backup_name), "{}", sentinel.backup_name);
    assert_eq!(sentinel.backup_name.len(), 23);
    assert_eq!(sentinel.restore_lsns.len(), 4);
    for content_id in 0..3 {
        assert_eq!(
            sentinel.restore_lsns.get(content_id),
            Some(format!("lsn{}", content_id).as_str())
        );
    }
    assert_eq!(sentinel.segments_metadata.len(), 4);
    assert_eq!(sentinel.segments.len(), 4);
    for id in sentinel.segments.keys() {
        assert!(sentinel.segments_metadata.contains_key(id));
    }
    assert_eq!(sentinel.uncompressed_size, 4 * 1024);
    assert!(sentinel.is_permanent);
    assert_eq!(sentinel.system_identifier, Some(7_311_826_312_885_441_903));
    assert!(fixture.sleeper.delays().is_empty());

    assert_eq!(fixture.control.restore_point_names(), vec![sentinel.backup_name.clone()]);
    let stored = download_sentinel(&fixture.root, &sentinel.backup_name)
        .await
        .unwrap();
    assert_eq!(stored, sentinel);
}

#[tokio::test]
async fn throttled_metadata_listing_is_absorbed_by_backoff() {
    let fixture = Fixture::new();
    fixture.root.fail_listings("segments_005/seg1/", 4).unwrap();
    let handler = fixture
        .handler(BackupArguments::default(), BackupConfig::new())
        .await;

    let sentinel = handler.handle_backup_push().await.unwrap();

    assert_eq!(sentinel.segments_metadata.len(), 4);
    assert_eq!(
        fixture.sleeper.delays(),
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(40),
        ]
    );
    assert_eq!(fixture.sleeper.total(), Duration::from_secs(75));
}

#[tokio::test]
async fn persistent_metadata_failure_aborts_after_five_retries() {
    let fixture = Fixture::new();
    fixture.root.fail_listings("segments_005/seg0/", 6).unwrap();
    let handler = fixture
        .handler(BackupArguments::default(), BackupConfig::new())
        .await;

    let err = handler.handle_backup_push().await.unwrap_err();

    match err {
        BackupError::SegmentMetadata {
            backup_id, retries, ..
        } => {
            assert_eq!(retries, 5);
            let seg0 = fixture
                .runner
                .executed()
                .await
                .into_iter()
                .find(|command| command.content_id == 0)
                .unwrap();
            let words = split_command_line(&seg0.command).unwrap();
            let dispatched =
                SegmentUserData::from_json(flag_value(&words, "add-user-data").unwrap()).unwrap();
            assert_eq!(backup_id, dispatched.id);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(fixture.sleeper.delays().len(), 5);
    assert!(!fixture.root.keys().unwrap().iter().any(|key| key.starts_with("basebackups_005/")));
}

#[tokio::test]
async fn failing_node_aborts_before_restore_point() {
    let fixture = Fixture::new();
    fixture.runner.fail_node(1, 1, "ERROR: could not open directory").await;
    fixture.runner.fail_node(2, 255, "ssh: connect to host sdw3 port 22").await;
    let handler = fixture
        .handler(BackupArguments::default(), BackupConfig::new())
        .await;

    let err = handler.handle_backup_push().await.unwrap_err();

    match &err {
        BackupError::ClusterCommand { failures, .. } => {
            let ids: Vec<i32> = failures.iter().map(|f| f.content_id).collect();
            assert_eq!(ids, vec![1, 2]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("segment 2 on sdw3 exited with 255"));
    // Only the discovery connection was opened.
    assert_eq!(fixture.control.connect_count(), 1);
    assert!(fixture.control.restore_point_names().is_empty());
}

#[tokio::test]
async fn partial_restore_point_is_fatal() {
    let mut fixture = Fixture::new();
    fixture.control = fixture
        .control
        .clone()
        .with_restore_point(RestorePointScript::Missing(vec![2]));
    let handler = fixture
        .handler(BackupArguments::default(), BackupConfig::new())
        .await;

    let err = handler.handle_backup_push().await.unwrap_err();

    assert!(matches!(err, BackupError::RestorePoint { .. }), "{}", err);
    assert!(err.to_string().contains("2"));
    assert_eq!(fixture.root.stats().unwrap().listings, 0);
}

#[tokio::test]
async fn rejected_restore_point_is_not_retried() {
    let mut fixture = Fixture::new();
    fixture.control = fixture
        .control
        .clone()
        .with_restore_point(RestorePointScript::Rejected("permission denied".to_string()));
    let handler = fixture
        .handler(BackupArguments::default(), BackupConfig::new())
        .await;

    let err = handler.handle_backup_push().await.unwrap_err();

    assert!(err.to_string().contains("permission denied"));
    assert_eq!(fixture.control.restore_point_names().len(), 1);
}

/// Accepts every write except sentinels at the top-level backup folder.
struct SentinelRejectingFolder {
    inner: Arc<dyn Folder>,
}

#[async_trait]
impl Folder for SentinelRejectingFolder {
    fn path(&self) -> &str {
        self.inner.path()
    }

    fn sub_folder(&self, relative: &str) -> Arc<dyn Folder> {
        Arc::new(SentinelRejectingFolder {
            inner: self.inner.sub_folder(relative),
        })
    }

    async fn read_object(&self, name: &str) -> Result<Vec<u8>> {
        self.inner.read_object(name).await
    }

    async fn put_object(&self, name: &str, content: Vec<u8>) -> Result<()> {
        if self.path() == "basebackups_005/" {
            return Err(BackupError::Storage("403 Forbidden".to_string()));
        }
        self.inner.put_object(name, content).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name).await
    }

    async fn list_folder(&self) -> Result<FolderListing> {
        self.inner.list_folder().await
    }
}

#[tokio::test]
async fn sentinel_upload_failure_is_reported_distinctly() {
    let fixture = Fixture::new();
    let folder = Arc::new(SentinelRejectingFolder {
        inner: Arc::new(fixture.root.clone()),
    });
    let handler = BackupHandler::new(
        BackupArguments::default(),
        fixture.workers_with_folder(folder),
        BackupConfig::new(),
    )
    .await
    .unwrap();

    let err = handler.handle_backup_push().await.unwrap_err();

    match err {
        BackupError::SentinelUpload {
            backup_name,
            source,
        } => {
            assert!(is_backup_name(&backup_name));
            assert!(source.to_string().contains("403 Forbidden"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn invocation_round_trips_user_data_and_forwarded_flags() {
    let fixture = Fixture::new();
    let config = BackupConfig::new()
        .worker_binary("/usr/local/bin/clusterbackup")
        .forwarded_config_path("/etc/clusterbackup/config.json");
    let arguments = BackupArguments::new(
        false,
        None,
        vec![SegmentFwdArg::new("full", "true")],
    );
    let handler = fixture.handler(arguments, config).await;

    let sentinel = handler.handle_backup_push().await.unwrap();

    let executed = fixture.runner.executed().await;
    assert_eq!(executed.len(), 4);
    for command in executed {
        let words = split_command_line(&command.command).unwrap();
        let segment = handler.cluster().topology.by_content(command.content_id).unwrap();
        assert_eq!(words[0], format!("PGPORT={}", segment.port));
        assert_eq!(words[4], segment.data_dir);
        assert_eq!(
            flag_value(&words, "storage-prefix"),
            Some(command.content_id.to_string().as_str())
        );
        assert_eq!(
            flag_value(&words, "config"),
            Some("/etc/clusterbackup/config.json")
        );
        assert_eq!(flag_value(&words, "full"), Some("true"));

        let user_data =
            SegmentUserData::from_json(flag_value(&words, "add-user-data").unwrap()).unwrap();
        assert_eq!(sentinel.segments.get(&user_data.id), Some(segment));
    }
}

#[tokio::test]
async fn excluding_the_coordinator_still_requires_its_restore_point() {
    let fixture = Fixture::new();
    let mut config = BackupConfig::new();
    config.include_coordinator = false;
    let handler = fixture.handler(BackupArguments::default(), config).await;

    let sentinel = handler.handle_backup_push().await.unwrap();

    assert_eq!(sentinel.segments.len(), 3);
    assert_eq!(sentinel.segments_metadata.len(), 3);
    assert_eq!(sentinel.restore_lsns.len(), 4);
    assert!(fixture.runner.executed().await.iter().all(|c| c.content_id >= 0));
}

#[tokio::test(start_paused = true)]
async fn run_deadline_aborts_a_hung_fan_out() {
    let root = MemoryFolder::new();
    let runner = clusterbackup::ScriptedCommandRunner::new().with_hook(Arc::new(|_: RemoteCommand| {
        async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        .boxed()
    }));
    let control = FakeControl::new(cluster_segments(3));
    let workers = BackupWorkers::new(Arc::new(root), Arc::new(runner), Arc::new(control));
    let config = BackupConfig::new().run_timeout(Duration::from_secs(600));
    let handler = BackupHandler::new(BackupArguments::default(), workers, config)
        .await
        .unwrap();

    let err = handler.handle_backup_push().await.unwrap_err();

    assert!(matches!(err, BackupError::Timeout { limit, .. } if limit == Duration::from_secs(600)));
}
