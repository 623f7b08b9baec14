//! Background cache maintenance and pre-warming

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{DomainError, MetricsRecorder, SearchParams};
use crate::infrastructure::search::service::{SearchCache, SemanticSearchService};

/// How often the maintenance loop sweeps expired entries.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Pressure snapshot produced by one maintenance pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub swept: usize,
    pub size: usize,
    pub max_size: usize,
    pub utilization: f64,
    pub evictions_since_last: u64,
}

/// Result of warming one key set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmReport {
    pub warmed: usize,
    pub failed: usize,
}

/// Keeps the search cache healthy: periodic TTL sweeps, pressure reporting,
/// and proactive population of a known-hot key set.
pub struct CacheOptimizer {
    cache: Arc<SearchCache>,
    search: Arc<SemanticSearchService>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl std::fmt::Debug for CacheOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOptimizer").finish()
    }
}

impl CacheOptimizer {
    pub fn new(
        cache: Arc<SearchCache>,
        search: Arc<SemanticSearchService>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            cache,
            search,
            metrics,
        }
    }

    /// Populates the cache for a known hot set by running the live retrieval
    /// path for each tuple, skipping the return-on-hit short-circuit.
    pub async fn warm(&self, targets: Vec<SearchParams>) -> Result<WarmReport, DomainError> {
        if targets.is_empty() {
            return Err(DomainError::validation("No keys to warm"));
        }

        for target in &targets {
            target.validate()?;
        }

        let mut warmed = 0;
        let mut failed = 0;

        for target in &targets {
            match self.search.refresh(target).await {
                Ok(()) => warmed += 1,
                Err(err) => {
                    debug!(query = %target.query, error = %err, "Warm target failed");
                    failed += 1;
                }
            }
        }

        info!(warmed, failed, "Cache warm pass finished");

        Ok(WarmReport { warmed, failed })
    }

    /// Snapshot for the cache management endpoints.
    pub fn cache_stats(&self) -> crate::domain::CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Cache cleared");
    }

    /// One maintenance pass: sweep expired entries, report pressure.
    pub fn maintain(&self) -> MaintenanceReport {
        let swept = self.cache.sweep();
        self.metrics.record_cache_sweep(swept);

        let stats = self.cache.stats();
        let report = MaintenanceReport {
            swept,
            size: stats.size,
            max_size: stats.max_size,
            utilization: stats.size as f64 / stats.max_size as f64,
            evictions_since_last: self.cache.take_eviction_count(),
        };

        debug!(
            swept = report.swept,
            size = report.size,
            evictions = report.evictions_since_last,
            "Cache maintenance pass"
        );

        report
    }

    /// Spawns the periodic maintenance loop; runs for the process lifetime.
    pub fn spawn_maintenance(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let report = self.maintain();

                if report.swept > 0 || report.evictions_since_last > 0 {
                    info!(
                        swept = report.swept,
                        evictions = report.evictions_since_last,
                        utilization = format!("{:.2}", report.utilization),
                        "Cache maintenance"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{NoopMetricsRecorder, PersonaContext, PersonaRegistry, Visibility};
    use crate::infrastructure::gateway::mock::MockEmbeddingGateway;
    use crate::infrastructure::vector_index::InMemoryVectorIndex;

    fn optimizer() -> (Arc<SearchCache>, CacheOptimizer, Arc<MockEmbeddingGateway>) {
        let cache = Arc::new(SearchCache::new(4));
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let personas = Arc::new(PersonaRegistry::new(vec![PersonaContext::new(
            "public",
            vec![Visibility::Public],
        )]));

        let search = Arc::new(SemanticSearchService::new(
            embeddings.clone(),
            Arc::new(InMemoryVectorIndex::new()),
            cache.clone(),
            personas,
            Arc::new(NoopMetricsRecorder),
        ));

        let optimizer =
            CacheOptimizer::new(cache.clone(), search, Arc::new(NoopMetricsRecorder));

        (cache, optimizer, embeddings)
    }

    #[tokio::test]
    async fn test_warm_populates_cache() {
        let (cache, optimizer, embeddings) = optimizer();

        let report = optimizer
            .warm(vec![
                SearchParams::new("query one", "public", 5, 0.0),
                SearchParams::new("query two", "public", 5, 0.0),
            ])
            .await
            .unwrap();

        assert_eq!(report.warmed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(cache.len(), 2);
        assert_eq!(embeddings.call_count(), 2);
    }

    #[tokio::test]
    async fn test_warm_rejects_empty_key_set() {
        let (_, optimizer, _) = optimizer();

        let err = optimizer.warm(Vec::new()).await.unwrap_err();
        assert_eq!(err.error_type(), "validation");
    }

    #[tokio::test]
    async fn test_warm_rejects_invalid_target() {
        let (cache, optimizer, _) = optimizer();

        let err = optimizer
            .warm(vec![SearchParams::new("", "public", 5, 0.0)])
            .await
            .unwrap_err();

        assert_eq!(err.error_type(), "validation");
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_warm_counts_unknown_persona_as_failed() {
        let (_, optimizer, _) = optimizer();

        let report = optimizer
            .warm(vec![SearchParams::new("query", "ghost", 5, 0.0)])
            .await
            .unwrap();

        assert_eq!(report.warmed, 0);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_maintain_sweeps_and_reports_pressure() {
        let (cache, optimizer, _) = optimizer();

        cache.set("stale", crate::domain::SearchOutcome::empty(), Duration::from_millis(10));
        cache.set("fresh", crate::domain::SearchOutcome::empty(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let report = optimizer.maintain();

        assert_eq!(report.swept, 1);
        assert_eq!(report.size, 1);
        assert_eq!(report.max_size, 4);
        assert!((report.utilization - 0.25).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_maintain_drains_eviction_counter() {
        let (cache, optimizer, _) = optimizer();

        for i in 0..6 {
            cache.set(
                format!("key{}", i),
                crate::domain::SearchOutcome::empty(),
                Duration::from_secs(60),
            );
        }

        let report = optimizer.maintain();
        assert_eq!(report.evictions_since_last, 2);

        let report = optimizer.maintain();
        assert_eq!(report.evictions_since_last, 0);
    }
}
