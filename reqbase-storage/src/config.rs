//! Store configuration.

use std::time::Duration;

/// Configuration shared by the collection store, cache, and snapshot engine.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound on any single persistence-adapter call.
    pub op_timeout: Duration,
    /// How many times a guarded write retries after observing a revision
    /// conflict before surfacing it to the caller.
    pub write_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(10),
            write_attempts: 3,
        }
    }
}

impl StoreConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call adapter timeout.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Set the number of guarded-write attempts.
    pub fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }
}
