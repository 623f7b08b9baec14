use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::state::AppState;
use super::{cache, health, search, sync};

/// Create the full router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        // Sync pipeline
        .route("/sync", post(sync::trigger_sync))
        .route("/sync/status", get(sync::sync_status))
        // Semantic search
        .route("/search", post(search::search))
        // Cache management
        .route("/cache", delete(cache::clear_cache).post(cache::cache_action))
        .route("/cache/stats", get(cache::cache_stats))
        // State and middleware
        .with_state(state)
        .layer(middleware::from_fn(super::middleware::logging_middleware))
        .layer(TraceLayer::new_for_http())
}
