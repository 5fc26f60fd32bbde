use super::metadata::{MetadataSource, SegmentBackupMetadata};
use crate::config::MetadataRetryPolicy;
use crate::core::{BackupError, Result, SegmentDescriptor, SegmentUserData};
use crate::retry::{ExponentialSleeper, RetryCursor, RetryDecision, SleepDriver};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Collects the metadata of every segment backup of one run.
///
/// Many segments listing storage at once can be throttled, so each fetch is
/// retried in place with exponential backoff. The retry budget is per segment
/// and resets when the aggregation moves on; the backoff sequence is shared by
/// the whole aggregation.
pub struct SegmentMetadataAggregator<'a> {
    source: &'a dyn MetadataSource,
    policy: &'a MetadataRetryPolicy,
    sleep_driver: Arc<dyn SleepDriver>,
}

impl<'a> SegmentMetadataAggregator<'a> {
    pub fn new(
        source: &'a dyn MetadataSource,
        policy: &'a MetadataRetryPolicy,
        sleep_driver: Arc<dyn SleepDriver>,
    ) -> Self {
        Self {
            source,
            policy,
            sleep_driver,
        }
    }

    /// Returns metadata keyed by segment user data id.
    ///
    /// Aborts on the first segment whose budget runs out, without attempting
    /// the segments after it.
    pub async fn aggregate(
        &self,
        segment_backups: &[(SegmentUserData, SegmentDescriptor)],
    ) -> Result<BTreeMap<String, SegmentBackupMetadata>> {
        let mut metadata = BTreeMap::new();
        let mut cursor = RetryCursor::new(segment_backups.len(), self.policy.max_retries);
        let mut sleeper = ExponentialSleeper::with_driver(
            self.policy.min_backoff(),
            self.policy.max_backoff(),
            self.sleep_driver.clone(),
        );

        while let Some(index) = cursor.current() {
            let (user_data, segment) = &segment_backups[index];
            match self.source.fetch(user_data, segment).await {
                Ok(meta) => {
                    metadata.insert(user_data.id.clone(), meta);
                    cursor.record_success();
                }
                Err(err) => match cursor.record_failure() {
                    RetryDecision::Retry { retries } => {
                        warn!(
                            backup_id = %user_data.id,
                            content_id = segment.content_id,
                            attempt = retries,
                            delay_secs = sleeper.next_delay().as_secs(),
                            error = %err,
                            "segment metadata fetch failed, retrying"
                        );
                        sleeper.sleep().await;
                    }
                    RetryDecision::GiveUp { retries } => {
                        return Err(BackupError::SegmentMetadata {
                            backup_id: user_data.id.clone(),
                            retries,
                            source: Box::new(err),
                        });
                    }
                },
            }
        }

        info!(segments = metadata.len(), "Fetched segment backups metadata");
        Ok(metadata)
    }
}
