//! Batch Result Module
//!
//! Partitioned outcome of a batch run.

use std::collections::HashMap;

use crate::error::FetchError;

// == Batch Result ==
/// Outcome of one `process_all` run.
///
/// Every de-duplicated input id lands in exactly one of `successful`,
/// `failed` or `cancelled`.
#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    /// Fetched values by id
    pub successful: HashMap<String, T>,
    /// Last error of entities whose retries were exhausted
    pub failed: HashMap<String, FetchError>,
    /// Ids that had no terminal outcome when the run was cancelled
    pub cancelled: Vec<String>,
    /// Wall-clock duration of the run
    pub processing_time_ms: u64,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            successful: HashMap::new(),
            failed: HashMap::new(),
            cancelled: Vec::new(),
            processing_time_ms: 0,
        }
    }
}

impl<T> BatchResult<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids accounted for across all partitions.
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len() + self.cancelled.len()
    }

    /// True when no entity failed or was cancelled.
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        !self.cancelled.is_empty()
    }
}
