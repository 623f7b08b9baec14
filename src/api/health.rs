//! Health check endpoints for liveness/readiness probes

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::domain::{ComponentHealth, HealthStatus};

use super::state::AppState;

/// Service health with optional per-component detail.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<ComponentHealth>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Basic liveness: 200 when the process is up.
pub async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: None,
        latency_ms: None,
    };

    (StatusCode::OK, Json(response))
}

/// Readiness: probes the relational store, vector index, and embedding
/// gateway - the same dependencies the sync preflight gates on.
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let mut checks = Vec::new();
    let mut overall = HealthStatus::Healthy;

    let store_check = probe("relational_store", state.store.health_check()).await;
    if store_check.status != HealthStatus::Healthy {
        overall = HealthStatus::Unhealthy;
    }
    checks.push(store_check);

    let index_check = probe("vector_index", state.index.health_check()).await;
    if index_check.status != HealthStatus::Healthy {
        overall = HealthStatus::Unhealthy;
    }
    checks.push(index_check);

    let gateway_check = probe("embedding_gateway", state.embeddings.health_check()).await;
    if gateway_check.status != HealthStatus::Healthy && overall == HealthStatus::Healthy {
        // Search degrades without the gateway but the process still serves
        overall = HealthStatus::Degraded;
    }
    checks.push(gateway_check);

    let response = HealthResponse {
        status: overall,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: Some(checks),
        latency_ms: Some(started.elapsed().as_millis() as u64),
    };

    let status_code = match overall {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

/// Liveness probe for orchestrators.
pub async fn live_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn probe<F>(name: &str, check: F) -> ComponentHealth
where
    F: std::future::Future<Output = Result<bool, crate::domain::DomainError>>,
{
    let started = Instant::now();
    let result = check.await;
    let latency = started.elapsed().as_millis() as u64;

    match result {
        Ok(true) => ComponentHealth::healthy(name, latency),
        Ok(false) => ComponentHealth::unhealthy(name, "reported unhealthy", latency),
        Err(e) => ComponentHealth::unhealthy(name, e.to_string(), latency),
    }
}
