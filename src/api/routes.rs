//! API Routes
//!
//! Configures the Axum router with all data-access endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    batch_handler, cache_action_handler, cache_stats_handler, entity_handler, health_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /api/batch` - Fetch many entities with bounded concurrency
/// - `GET /api/entity/:id` - Fetch one entity through the cache
/// - `GET /api/cache` - Cache statistics and insights
/// - `POST /api/cache` - Cache maintenance (cleanup, clear, stats)
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/batch", post(batch_handler))
        .route("/api/entity/:id", get(entity_handler))
        .route(
            "/api/cache",
            get(cache_stats_handler).post(cache_action_handler),
        )
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
