//! API middleware: admin auth and request logging

pub mod auth;
pub mod logging;

use std::time::Instant;

use axum::http::request::Parts;
use axum::http::HeaderMap;

pub use auth::RequireAdminToken;
pub use logging::logging_middleware;

/// Correlation id for a request: the inbound `x-request-id` header, or a
/// fresh uuid when the caller sent none.
pub fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Per-request metadata handed to handlers for error envelopes and timing.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub request_id: String,
    pub started: Instant,
}

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for RequestMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            request_id: request_id_from_headers(&parts.headers),
            started: Instant::now(),
        })
    }
}
