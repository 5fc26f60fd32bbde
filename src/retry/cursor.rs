/// Outcome of recording a failed attempt on a [`RetryCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the same item; `retries` counts retries spent on it so far.
    Retry { retries: u32 },
    /// The per-item budget is spent.
    GiveUp { retries: u32 },
}

/// Walks a list by index, retrying the current item in place.
///
/// The retry budget belongs to the item under the cursor and is reset
/// whenever the cursor advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryCursor {
    index: usize,
    retries_at_index: u32,
    max_retries: u32,
    len: usize,
}

impl RetryCursor {
    pub fn new(len: usize, max_retries: u32) -> Self {
        Self {
            index: 0,
            retries_at_index: 0,
            max_retries,
            len,
        }
    }

    /// Index of the item to attempt next, or `None` once every item succeeded.
    pub fn current(&self) -> Option<usize> {
        (self.index < self.len).then_some(self.index)
    }

    pub fn retries_at_index(&self) -> u32 {
        self.retries_at_index
    }

    pub fn record_success(&mut self) {
        self.retries_at_index = 0;
        self.index += 1;
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        if self.retries_at_index < self.max_retries {
            self.retries_at_index += 1;
            RetryDecision::Retry {
                retries: self.retries_at_index,
            }
        } else {
            RetryDecision::GiveUp {
                retries: self.retries_at_index,
            }
        }
    }
}
