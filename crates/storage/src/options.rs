//! Tuning knobs for a store instance

use std::time::Duration;

/// Default upper bound on calls coalesced into one batch commit
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Default time a batch leader waits for more calls
pub const DEFAULT_MAX_BATCH_DELAY: Duration = Duration::from_millis(10);

/// Options applied when a driver opens a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// A pending batch is flushed once it holds this many calls
    pub max_batch_size: usize,
    /// A pending batch is flushed after waiting this long
    pub max_batch_delay: Duration,
    /// fsync the data file before a commit becomes visible
    pub sync_on_commit: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_delay: DEFAULT_MAX_BATCH_DELAY,
            sync_on_commit: true,
        }
    }
}

impl StoreOptions {
    /// Set the batch size limit (values below 1 are treated as 1)
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Set the batch delay
    pub fn with_max_batch_delay(mut self, delay: Duration) -> Self {
        self.max_batch_delay = delay;
        self
    }

    /// Toggle fsync on commit
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }
}
