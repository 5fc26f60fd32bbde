use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Suspends the caller for a given duration.
///
/// Production code uses [`TokioSleepDriver`]; tests substitute a driver that
/// records the requested delays instead of waiting them out.
#[async_trait]
pub trait SleepDriver: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleepDriver;

#[async_trait]
impl SleepDriver for TokioSleepDriver {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records every requested delay and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleepDriver {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleepDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        match self.delays.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn total(&self) -> Duration {
        self.delays().into_iter().sum()
    }
}

#[async_trait]
impl SleepDriver for RecordingSleepDriver {
    async fn sleep(&self, duration: Duration) {
        match self.delays.lock() {
            Ok(mut guard) => guard.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}

/// Exponential backoff without jitter: `min`, `2*min`, `4*min`, ... capped at `max`.
///
/// State lives in the instance, so restarting the sequence means building a
/// new sleeper.
pub struct ExponentialSleeper {
    current: Duration,
    max: Duration,
    driver: Arc<dyn SleepDriver>,
}

impl ExponentialSleeper {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self::with_driver(min, max, Arc::new(TokioSleepDriver))
    }

    pub fn with_driver(min: Duration, max: Duration, driver: Arc<dyn SleepDriver>) -> Self {
        let max = max.max(min);
        Self {
            current: min,
            max,
            driver,
        }
    }

    /// Delay the next call to [`sleep`](Self::sleep) will wait.
    pub fn next_delay(&self) -> Duration {
        self.current
    }

    pub async fn sleep(&mut self) {
        let delay = self.current;
        self.current = delay.saturating_mul(2).min(self.max);
        self.driver.sleep(delay).await;
    }
}
