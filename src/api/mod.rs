//! API Module
//!
//! HTTP handlers and routing for the data-access REST API.
//!
//! # Endpoints
//! - `POST /api/batch` - Fetch many entities with bounded concurrency
//! - `GET /api/entity/:id` - Fetch one entity through the cache
//! - `GET /api/cache` - Cache statistics and insights
//! - `POST /api/cache` - Cache maintenance actions
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
