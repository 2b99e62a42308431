//! Batch Module
//!
//! Bounded-concurrency batch fetching with retry and failure isolation.

mod backoff;
mod options;
mod processor;
mod result;

pub use backoff::retry_delay;
pub use options::{
    BatchOptions, DEFAULT_BACKOFF_BASE, DEFAULT_BASE_DELAY, DEFAULT_BATCH_INTERVAL,
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_DELAY, DEFAULT_RETRY_ATTEMPTS,
};
pub use processor::BatchProcessor;
pub use result::BatchResult;
