//! Civic Cache - a data-access resilience layer for civic data APIs
//!
//! Provides a TTL/LRU cache, single-flight cache-aside fetching, and a
//! batch processor with bounded concurrency, retry with exponential backoff
//! and per-entity failure isolation.

pub mod api;
pub mod batch;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod tasks;
pub mod upstream;

pub use api::AppState;
pub use batch::{BatchOptions, BatchProcessor, BatchResult};
pub use cache::{CacheInsights, CacheStats, CacheStore, SharedCache};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::Config;
pub use error::{ApiError, BatchError, FetchError};
pub use fetch::CachedFetcher;
pub use tasks::spawn_cleanup_task;
pub use upstream::{HttpUpstream, Upstream};
