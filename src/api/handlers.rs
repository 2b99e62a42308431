//! API Handlers
//!
//! HTTP request handlers for each data-access endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::batch::{BatchOptions, BatchProcessor};
use crate::cache::{self, CacheStore, SharedCache};
use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::error::{FetchError, Result};
use crate::fetch::CachedFetcher;
use crate::models::requests::validate_id;
use crate::models::{
    BatchRequest, BatchResponse, CacheAction, CacheActionRequest, CacheActionResponse,
    CacheStatsResponse, EntityResponse, HealthResponse,
};
use crate::upstream::{HttpUpstream, Upstream};

/// Cache key under which an entity payload is stored.
pub fn entity_key(id: &str) -> String {
    format!("entity:{id}")
}

/// Application state shared across all handlers.
///
/// Contains the cache store wrapped in Arc<RwLock<>> for thread-safe access,
/// the single-flight fetcher in front of it and the upstream behind it.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe cache store
    pub cache: SharedCache<Value>,
    /// Single-flight cache-aside fetcher over `cache`
    pub fetcher: CachedFetcher<Value>,
    /// Source of entity payloads
    pub upstream: Arc<dyn Upstream>,
    /// TTL applied to fetched entities
    pub default_ttl: Duration,
    /// Largest accepted batch
    pub max_batch_ids: usize,
    /// Options a batch request starts from before its overrides
    pub batch_defaults: BatchOptions,
    /// Fires when the server begins shutting down
    pub shutdown: CancelSignal,
}

impl AppState {
    /// Creates a new AppState over the given store and upstream, with
    /// default limits.
    pub fn new(cache: CacheStore<Value>, upstream: Arc<dyn Upstream>) -> Self {
        let defaults = Config::default();
        let cache = cache::shared(cache);
        Self {
            fetcher: CachedFetcher::new(Arc::clone(&cache)),
            cache,
            upstream,
            default_ttl: defaults.default_ttl(),
            max_batch_ids: defaults.max_batch_ids,
            batch_defaults: BatchOptions::default(),
            shutdown: CancelSignal::never(),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Builds the HTTP upstream and bounds every single-flight fetch by the
    /// configured upstream timeout.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let upstream = HttpUpstream::new(&config.upstream_url_template, config.upstream_timeout())?;
        let mut state = Self::new(CacheStore::new(config.max_entries), Arc::new(upstream));
        state.fetcher = state.fetcher.with_timeout(config.upstream_timeout());
        state.default_ttl = config.default_ttl();
        state.max_batch_ids = config.max_batch_ids;
        Ok(state)
    }

    pub fn with_batch_defaults(mut self, options: BatchOptions) -> Self {
        self.batch_defaults = options;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancelSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Fetches one entity through the cache, sharing any in-flight upstream call.
    pub async fn fetch_entity(&self, id: String) -> std::result::Result<Value, FetchError> {
        let key = entity_key(&id);
        let upstream = Arc::clone(&self.upstream);
        self.fetcher
            .fetch_with_cancel(&key, self.default_ttl, &self.shutdown, move || {
                upstream.fetch(id)
            })
            .await
    }
}

/// Handler for POST /api/batch
///
/// Fetches every requested entity. Individual failures are reported in the
/// body; only malformed requests are rejected.
pub async fn batch_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>> {
    req.validate(state.max_batch_ids)?;
    let options = req.batch_options(state.batch_defaults.clone())?;

    let total_requested = req.ids.len();
    let processor = BatchProcessor::with_options(options);
    let result = processor
        .process_all_with_cancel(
            req.ids,
            |id| state.fetch_entity(id),
            &state.shutdown,
        )
        .await?;

    Ok(Json(BatchResponse::from_result(total_requested, result)))
}

/// Handler for GET /api/entity/:id
///
/// Returns a single entity, from cache when present.
pub async fn entity_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntityResponse>> {
    validate_id(&id)?;
    let data = state.fetch_entity(id.clone()).await?;

    Ok(Json(EntityResponse::new(id, data)))
}

/// Handler for GET /api/cache
///
/// Returns cache statistics with derived insights.
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let stats = state.cache.read().await.stats();
    Json(CacheStatsResponse::new(stats))
}

/// Handler for POST /api/cache
///
/// Runs a maintenance action on the cache.
pub async fn cache_action_handler(
    State(state): State<AppState>,
    Json(req): Json<CacheActionRequest>,
) -> Json<CacheActionResponse> {
    let mut cache = state.cache.write().await;

    let response = match req.action {
        CacheAction::Cleanup => {
            let removed = cache.cleanup();
            info!(removed, "cache cleanup requested");
            CacheActionResponse::new(
                format!("Removed {removed} expired entries"),
                Some(removed),
                cache.stats(),
            )
        }
        CacheAction::Clear => {
            let removed = cache.len();
            cache.clear();
            info!(removed, "cache cleared");
            CacheActionResponse::new("Cache cleared", Some(removed), cache.stats())
        }
        CacheAction::Stats => {
            CacheActionResponse::new("Statistics retrieved", None, cache.stats())
        }
    };

    Json(response)
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
