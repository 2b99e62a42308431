//! Upstream Module
//!
//! Source of per-entity JSON payloads behind the cache.

mod http;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::FetchError;

pub use http::HttpUpstream;

/// Fetches one entity by id.
///
/// Returns a `'static` future so the call can be handed to a single-flight
/// producer task.
pub trait Upstream: Send + Sync {
    fn fetch(&self, id: String) -> BoxFuture<'static, Result<Value, FetchError>>;
}
