//! Semantic search endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::{SearchFacets, SearchParams, SearchResultItem};

use super::middleware::RequestMeta;
use super::state::AppState;
use super::types::ApiError;

/// Query parameters of `POST /search`.
#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
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

/// Response body of `POST /search`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub persona: String,
    pub results: Vec<SearchResultItem>,
    pub facets: SearchFacets,
    pub metadata: SearchResponseMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponseMetadata {
    pub total_results: usize,
    pub response_time: u64,
    pub cached: bool,
}

/// `POST /search?q=&persona=&limit=&threshold=` - relevance-ranked context
/// lookup. Only validation failures surface as errors; degraded searches
/// still answer 200 with an empty result set.
pub async fn search(
    State(state): State<AppState>,
    meta: RequestMeta,
    Query(params): Query<SearchQueryParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let search_params = SearchParams::new(
        params.q.clone(),
        params.persona.clone(),
        params.limit,
        params.threshold,
    );

    let hit = state
        .search_service
        .search(search_params)
        .await
        .map_err(|err| ApiError::from_domain(&err, &meta.request_id, meta.started))?;

    Ok(Json(SearchResponse {
        query: params.q,
        persona: params.persona,
        metadata: SearchResponseMetadata {
            total_results: hit.outcome.results.len(),
            response_time: meta.started.elapsed().as_millis() as u64,
            cached: hit.cached,
        },
        results: hit.outcome.results,
        facets: hit.outcome.facets,
    }))
}
