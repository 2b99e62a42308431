//! Request and Response models for the data-access API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{BatchOptionsRequest, BatchRequest, CacheAction, CacheActionRequest};
pub use responses::{
    BatchMetadata, BatchResponse, CacheActionResponse, CacheStatsResponse, EntityResponse,
    ErrorResponse, HealthResponse,
};
