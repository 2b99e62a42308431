//! Batch Options Module
//!
//! Typed configuration for a batch run, with documented defaults.

use std::time::Duration;

use tokio::sync::Semaphore;

use crate::batch::backoff;
use crate::error::BatchError;

/// Default number of ids per chunk.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default pause between chunks.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(2_000);

/// Default ceiling on simultaneous per-entity attempts.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default multiplier of the exponential backoff.
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// Default unit delay the backoff multiplier is applied to.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default cap on a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

// == Batch Options ==
/// Options for one `process_all` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Ids per chunk (default 50)
    pub batch_size: usize,
    /// Pause after each chunk except the last (default 2s)
    pub batch_interval: Duration,
    /// Simultaneous attempts across the whole run (default 5)
    pub max_concurrent: usize,
    /// Retries after the first attempt (default 3)
    pub retry_attempts: u32,
    /// Growth factor between retry delays (default 2.0)
    pub exponential_backoff_base: f64,
    /// Delay unit: retry `n` waits `base_delay * base^n` (default 500ms)
    pub base_delay: Duration,
    /// Upper bound on any retry delay (default 30s)
    pub max_delay: Duration,
    /// Deadline for a single attempt; none by default
    pub attempt_timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            exponential_backoff_base: DEFAULT_BACKOFF_BASE,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            attempt_timeout: None,
        }
    }
}

impl BatchOptions {
    /// Checks that the options describe a runnable batch.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.batch_size == 0 {
            return Err(BatchError::InvalidOptions(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(BatchError::InvalidOptions(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(BatchError::InvalidOptions(format!(
                "max_concurrent must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if !self.exponential_backoff_base.is_finite() || self.exponential_backoff_base < 1.0 {
            return Err(BatchError::InvalidOptions(format!(
                "exponential_backoff_base must be a finite number >= 1, got {}",
                self.exponential_backoff_base
            )));
        }
        if self.attempt_timeout.is_some_and(|t| t.is_zero()) {
            return Err(BatchError::InvalidOptions(
                "attempt_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before retry `attempt` (1-indexed).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        backoff::retry_delay(
            self.base_delay,
            self.exponential_backoff_base,
            attempt,
            self.max_delay,
        )
    }
}
