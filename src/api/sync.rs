//! Sync trigger and status endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::{SyncStatus, SyncSummary};

use super::middleware::{RequestMeta, RequireAdminToken};
use super::state::AppState;
use super::types::ApiError;

/// Query parameters of `POST /sync`.
#[derive(Debug, Deserialize)]
pub struct SyncQueryParams {
    #[serde(rename = "type")]
    pub sync_type: String,
    #[serde(default)]
    pub force: Option<bool>,
    #[serde(default)]
    pub database: Option<String>,
}

/// Body of a successful sync trigger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub results: SyncSummary,
    pub duration: u64,
}

/// `POST /sync?type=full|incremental|database` - runs a sync under the
/// admin bearer token. `partial` runs answer 206; fatal aborts map onto the
/// failure taxonomy (503/502/504), an in-flight run onto 429.
pub async fn trigger_sync(
    State(state): State<AppState>,
    _auth: RequireAdminToken,
    meta: RequestMeta,
    Query(params): Query<SyncQueryParams>,
) -> Result<Response, ApiError> {
    let summary = match params.sync_type.as_str() {
        "full" => state
            .sync_service
            .run_full(params.force.unwrap_or(false))
            .await,
        "incremental" => state.sync_service.run_incremental().await,
        "database" => {
            let name = params.database.as_deref().ok_or_else(|| {
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "validation",
                    "Missing 'database' parameter",
                    meta.request_id.clone(),
                    meta.started.elapsed().as_millis() as u64,
                )
            })?;

            state.sync_service.run_table(name).await
        }
        other => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "validation",
                format!("Unknown sync type '{}'", other),
                meta.request_id,
                meta.started.elapsed().as_millis() as u64,
            ));
        }
    }
    .map_err(|err| ApiError::from_domain(&err, &meta.request_id, meta.started))?;

    let duration = meta.started.elapsed().as_millis() as u64;

    if let Some(abort) = &summary.error {
        return Err(ApiError::from_abort(
            &abort.error_type,
            &abort.message,
            &meta.request_id,
            duration,
        ));
    }

    let status_code = match summary.status {
        SyncStatus::Success => StatusCode::OK,
        SyncStatus::Partial => StatusCode::PARTIAL_CONTENT,
        // Every table failed against an external source
        SyncStatus::Failed => StatusCode::BAD_GATEWAY,
    };

    let body = SyncResponse {
        success: summary.status == SyncStatus::Success,
        results: summary,
        duration,
    };

    Ok((status_code, Json(body)).into_response())
}

/// `GET /sync/status` - reports sync capability and configuration.
pub async fn sync_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sync_service.capabilities())
}
