//! API error envelope
//!
//! Every failure response carries a stable `errorType`, a human-readable
//! message, the request correlation id, and timing for operational triage.

use std::time::Instant;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// JSON body of a failure response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub error_type: String,
    pub message: String,
    pub request_id: String,
    pub duration_ms: u64,
    /// Debug detail, only populated in non-release builds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// API error with its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        error_type: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error_type: error_type.into(),
                message: message.into(),
                request_id: request_id.into(),
                duration_ms,
                detail: None,
            },
        }
    }

    /// Maps the domain taxonomy onto the HTTP failure surface.
    pub fn from_domain(err: &DomainError, request_id: &str, started: Instant) -> Self {
        let status = status_for(err);
        let mut api_error = Self::new(
            status,
            err.error_type(),
            err.to_string(),
            request_id,
            started.elapsed().as_millis() as u64,
        );

        if cfg!(debug_assertions) {
            api_error.body.detail = Some(format!("{:?}", err));
        }

        api_error
    }

    /// Same taxonomy for errors carried inside an aborted sync summary.
    pub fn from_abort(
        error_type: &str,
        message: &str,
        request_id: &str,
        duration_ms: u64,
    ) -> Self {
        let status = match error_type {
            "configuration" | "database" => StatusCode::SERVICE_UNAVAILABLE,
            "external_api" => StatusCode::BAD_GATEWAY,
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            "rate_limit" => StatusCode::TOO_MANY_REQUESTS,
            "validation" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self::new(status, error_type, message, request_id, duration_ms)
    }

    pub fn unauthorized(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            message,
            request_id,
            0,
        )
    }
}

fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Configuration { .. } | DomainError::Database { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        DomainError::ExternalApi { .. } => StatusCode::BAD_GATEWAY,
        DomainError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DomainError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
        DomainError::Validation { .. } => StatusCode::BAD_REQUEST,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Cache { .. } | DomainError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.body.error_type, self.body.message)
    }
}

impl std::error::Error for ApiError {}
