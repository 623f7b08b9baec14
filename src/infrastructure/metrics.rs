//! Prometheus-backed metrics recorder

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::{MetricsRecorder, SyncSummary};

/// Handle for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the Prometheus recorder. Returns `None` (callers fall back to the
/// no-op recorder) when disabled or when installation fails.
pub fn init_metrics(enabled: bool) -> Option<PrometheusMetrics> {
    if !enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("content_pipeline_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            tracing::info!("Prometheus metrics initialized");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

pub fn create_metrics_router(metrics: PrometheusMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// [`MetricsRecorder`] implementation publishing through the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetricsRecorder;

impl MetricsRecorder for PrometheusMetricsRecorder {
    fn record_cache_hit(&self, latency: Duration) {
        counter!("search_cache_hits_total").increment(1);
        histogram!("search_cache_hit_duration_seconds").record(latency.as_secs_f64());
    }

    fn record_cache_miss(&self) {
        counter!("search_cache_misses_total").increment(1);
    }

    fn record_search(&self, duration: Duration, results: usize, cached: bool) {
        let labels = [("cached", if cached { "true" } else { "false" }.to_string())];

        counter!("search_requests_total", &labels).increment(1);
        histogram!("search_duration_seconds", &labels).record(duration.as_secs_f64());
        histogram!("search_result_count", &labels).record(results as f64);
    }

    fn record_sync_run(&self, kind: &str, summary: &SyncSummary) {
        let labels = [
            ("kind", kind.to_string()),
            ("status", format!("{:?}", summary.status).to_lowercase()),
        ];

        counter!("sync_runs_total", &labels).increment(1);
        counter!("sync_records_loaded_total", "kind" => kind.to_string())
            .increment(summary.total_loaded);
        counter!("sync_errors_total", "kind" => kind.to_string())
            .increment(summary.total_errors);
        histogram!("sync_duration_seconds", &labels)
            .record(summary.duration_ms as f64 / 1000.0);
    }

    fn record_cache_sweep(&self, removed: usize) {
        counter!("cache_swept_entries_total").increment(removed as u64);
    }
}
