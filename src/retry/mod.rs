pub mod cursor;
pub mod sleeper;

pub use cursor::{RetryCursor, RetryDecision};
pub use sleeper::{ExponentialSleeper, RecordingSleepDriver, SleepDriver, TokioSleepDriver};
