//! Error types for the data-access layer
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

// == Fetch Error ==
/// Failure of a single upstream fetch.
///
/// Cloneable so one single-flight outcome can be handed to every waiter,
/// and so a batch can keep the last error per entity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network failure or malformed upstream payload
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// The fetch did not settle within its deadline
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller stopped waiting
    #[error("Request cancelled")]
    Cancelled,

    /// Bookkeeping failure not attributable to the upstream
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Creates an upstream error from any displayable message.
    pub fn upstream(msg: impl Into<String>) -> Self {
        FetchError::Upstream(msg.into())
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        FetchError::Upstream(format!("{err:#}"))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match (err.status(), err.url()) {
            (Some(status), Some(url)) => FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            },
            _ => FetchError::Upstream(err.to_string()),
        }
    }
}

// == Batch Error ==
/// Rejection of a batch before any work is dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("Invalid batch options: {0}")]
    InvalidOptions(String),
}

// == API Error ==
/// Errors surfaced by the HTTP layer.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed input, rejected before any work is dispatched
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Batch exceeds the configured maximum size
    #[error("Too many ids: {requested} requested, maximum is {max}")]
    TooLarge { requested: usize, max: usize },

    /// A single-entity fetch failed
    #[error(transparent)]
    Upstream(#[from] FetchError),

    /// Unexpected failure in the layer's own bookkeeping
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ApiError::Upstream(FetchError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, self.to_string())
            }
            ApiError::Upstream(FetchError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ApiError::Upstream(FetchError::Internal(detail)) | ApiError::Internal(detail) => {
                error!(detail = %detail, "internal error while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for HTTP handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
