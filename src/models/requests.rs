//! Request DTOs for the data-access API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::time::Duration;

use serde::Deserialize;

use crate::batch::BatchOptions;
use crate::error::ApiError;

/// Longest entity id accepted from clients.
pub const MAX_ID_LENGTH: usize = 128;

/// Largest `retryAttempts` a client may request.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Largest `batchIntervalMs` a client may request.
pub const MAX_BATCH_INTERVAL_MS: u64 = 60_000;

/// Largest `maxConcurrent` a client may request.
pub const MAX_CONCURRENT: usize = 64;

/// Request body for POST /api/batch
///
/// # Fields
/// - `ids`: Entity ids to fetch; duplicates are fetched once
/// - `options`: Optional per-request overrides of the batch defaults
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub options: Option<BatchOptionsRequest>,
}

impl BatchRequest {
    /// Rejects the request before any fetch is dispatched.
    pub fn validate(&self, max_ids: usize) -> Result<(), ApiError> {
        if self.ids.is_empty() {
            return Err(ApiError::Validation("ids must not be empty".to_string()));
        }
        if self.ids.len() > max_ids {
            return Err(ApiError::TooLarge {
                requested: self.ids.len(),
                max: max_ids,
            });
        }
        self.ids.iter().try_for_each(|id| validate_id(id))
    }

    /// Batch options with this request's overrides applied over `defaults`.
    pub fn batch_options(&self, defaults: BatchOptions) -> Result<BatchOptions, ApiError> {
        let options = match &self.options {
            Some(overrides) => {
                overrides.validate()?;
                overrides.apply(defaults)
            }
            None => defaults,
        };
        options.validate()?;
        Ok(options)
    }
}

/// Client-tunable subset of [`BatchOptions`], all optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptionsRequest {
    pub batch_size: Option<usize>,
    pub batch_interval_ms: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub exponential_backoff_base: Option<f64>,
}

impl BatchOptionsRequest {
    /// Rejects overrides outside the ranges a client is allowed to ask for.
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(attempts) = self.retry_attempts {
            if attempts > MAX_RETRY_ATTEMPTS {
                return Err(ApiError::Validation(format!(
                    "retryAttempts must be at most {MAX_RETRY_ATTEMPTS}"
                )));
            }
        }
        if let Some(ms) = self.batch_interval_ms {
            if ms > MAX_BATCH_INTERVAL_MS {
                return Err(ApiError::Validation(format!(
                    "batchIntervalMs must be at most {MAX_BATCH_INTERVAL_MS}"
                )));
            }
        }
        if let Some(max_concurrent) = self.max_concurrent {
            if max_concurrent > MAX_CONCURRENT {
                return Err(ApiError::Validation(format!(
                    "maxConcurrent must be at most {MAX_CONCURRENT}"
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, mut options: BatchOptions) -> BatchOptions {
        if let Some(batch_size) = self.batch_size {
            options.batch_size = batch_size;
        }
        if let Some(ms) = self.batch_interval_ms {
            options.batch_interval = Duration::from_millis(ms);
        }
        if let Some(max_concurrent) = self.max_concurrent {
            options.max_concurrent = max_concurrent;
        }
        if let Some(retry_attempts) = self.retry_attempts {
            options.retry_attempts = retry_attempts;
        }
        if let Some(base) = self.exponential_backoff_base {
            options.exponential_backoff_base = base;
        }
        options
    }
}

/// Request body for POST /api/cache
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CacheActionRequest {
    pub action: CacheAction,
}

/// Maintenance operation on the shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheAction {
    /// Remove expired entries now
    Cleanup,
    /// Drop every entry; hit and miss counters are kept
    Clear,
    /// Report stats without changing anything
    Stats,
}

/// Checks a single entity id supplied by a client.
pub fn validate_id(id: &str) -> Result<(), ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::Validation("ids must not be blank".to_string()));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(ApiError::Validation(format!(
            "id exceeds maximum length of {MAX_ID_LENGTH} characters"
        )));
    }
    if id.contains(['/', '?', '#']) {
        return Err(ApiError::Validation(format!(
            "id contains a reserved character: {id}"
        )));
    }
    Ok(())
}
