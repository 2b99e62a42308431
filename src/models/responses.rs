//! Response DTOs for the data-access API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::batch::BatchResult;
use crate::cache::{CacheInsights, CacheStats};

/// Response body for POST /api/batch
///
/// Entity failures are itemised in `errors`; the request itself succeeds.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    /// Fetched payloads by id
    pub data: HashMap<String, Value>,
    /// Error message by id for entities whose retries were exhausted
    pub errors: HashMap<String, String>,
    /// Ids left unfinished by cancellation
    pub cancelled: Vec<String>,
    pub metadata: BatchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    /// Ids in the request, duplicates included
    pub total_requested: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub processing_time_ms: u64,
}

impl BatchResponse {
    /// Builds the response from a batch outcome.
    pub fn from_result(total_requested: usize, result: BatchResult<Value>) -> Self {
        let metadata = BatchMetadata {
            total_requested,
            successful: result.successful.len(),
            failed: result.failed.len(),
            cancelled: result.cancelled.len(),
            processing_time_ms: result.processing_time_ms,
        };

        Self {
            data: result.successful,
            errors: result
                .failed
                .into_iter()
                .map(|(id, err)| (id, err.to_string()))
                .collect(),
            cancelled: result.cancelled,
            metadata,
        }
    }
}

/// Response body for GET /api/entity/:id
#[derive(Debug, Clone, Serialize)]
pub struct EntityResponse {
    pub id: String,
    pub data: Value,
}

impl EntityResponse {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Response body for GET /api/cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    pub stats: CacheStats,
    pub insights: CacheInsights,
}

impl CacheStatsResponse {
    /// Creates a response with insights derived from `stats`
    pub fn new(stats: CacheStats) -> Self {
        let insights = CacheInsights::from_stats(&stats);
        Self { stats, insights }
    }
}

/// Response body for POST /api/cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheActionResponse {
    /// Human-readable summary of what was done
    pub message: String,
    /// Entries removed by the action, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
    /// Stats after the action
    pub stats: CacheStats,
}

impl CacheActionResponse {
    pub fn new(message: impl Into<String>, removed: Option<usize>, stats: CacheStats) -> Self {
        Self {
            message: message.into(),
            removed,
            stats,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
