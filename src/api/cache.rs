//! Cache management endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::{CacheStats, SearchParams};
use crate::infrastructure::WarmReport;

use super::middleware::RequestMeta;
use super::state::AppState;
use super::types::ApiError;

/// `GET /cache/stats`
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache_service.stats())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
}

/// `DELETE /cache`
pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache_service.clear();

    Json(ClearResponse {
        success: true,
        message: "Cache cleared".to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CacheActionParams {
    pub action: String,
}

/// One key to warm: the same tuple a live search would use.
#[derive(Debug, Deserialize)]
pub struct WarmKey {
    pub q: String,
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub threshold: f32,
}

fn default_persona() -> String {
    "public".to_string()
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct WarmRequest {
    pub keys: Vec<WarmKey>,
}

/// `POST /cache?action=warm` - pre-populates the cache for a known hot set.
pub async fn cache_action(
    State(state): State<AppState>,
    meta: RequestMeta,
    Query(params): Query<CacheActionParams>,
    Json(request): Json<WarmRequest>,
) -> Result<Json<WarmReport>, ApiError> {
    if params.action != "warm" {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "validation",
            format!("Unknown cache action '{}'", params.action),
            meta.request_id,
            meta.started.elapsed().as_millis() as u64,
        ));
    }

    let targets: Vec<SearchParams> = request
        .keys
        .into_iter()
        .map(|k| SearchParams::new(k.q, k.persona, k.limit, k.threshold))
        .collect();

    let report = state
        .cache_service
        .warm(targets)
        .await
        .map_err(|err| ApiError::from_domain(&err, &meta.request_id, meta.started))?;

    Ok(Json(report))
}
