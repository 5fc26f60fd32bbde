use super::error::{BackupError, Result};
use std::future::Future;
use std::time::Duration;

/// Runs `future` to completion, or fails with `Timeout` once `limit` elapses.
///
/// Dropping the future on expiry drops whatever it owned, so child processes
/// spawned with `kill_on_drop` are killed.
pub async fn with_deadline<F, T>(operation: &str, limit: Option<Duration>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| BackupError::Timeout {
                operation: operation.to_string(),
                limit,
            })?,
        None => future.await,
    }
}
