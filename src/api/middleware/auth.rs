//! Admin bearer-token authentication
//!
//! A single token comparison: sync triggers require the configured admin
//! bearer token; a deployment without one cannot run syncs at all.

use axum::{extract::FromRequestParts, http::request::Parts, http::StatusCode};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;

use super::request_id_from_headers;

/// Extractor that rejects requests without the admin bearer token.
#[derive(Debug, Clone)]
pub struct RequireAdminToken;

impl FromRequestParts<AppState> for RequireAdminToken {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let request_id = request_id_from_headers(&parts.headers);

        let Some(expected) = state.admin_token.as_deref() else {
            return Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "configuration",
                "Admin bearer token is not configured",
                request_id,
                0,
            ));
        };

        let provided = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(token) if token == expected => {
                debug!(request_id = %request_id, "Admin token accepted");
                Ok(RequireAdminToken)
            }
            Some(_) => Err(ApiError::unauthorized("Invalid bearer token", request_id)),
            None => Err(ApiError::unauthorized(
                "Missing Authorization: Bearer token",
                request_id,
            )),
        }
    }
}
