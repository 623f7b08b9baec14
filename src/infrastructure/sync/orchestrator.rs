//! Sync orchestration across all configured source tables

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::domain::{
    DomainError, EmbeddingGateway, MetricsRecorder, RetryPolicy, SourceTableConfig, SyncRunResult,
    SyncSummary,
};
use crate::infrastructure::relational::RelationalStore;
use crate::infrastructure::sync::adapter::TableSyncAdapter;
use crate::infrastructure::vector_index::VectorIndex;

/// Sync configuration reported by `GET /sync/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCapabilities {
    pub tables: Vec<SourceTableConfig>,
    pub running: bool,
    pub run_budget_secs: u64,
}

/// Runs preflight health checks and coordinates full/incremental sync,
/// aggregating per-table results into a run summary.
///
/// One run at a time: full and incremental runs share a single-flight lock,
/// and a trigger arriving mid-run is rejected rather than queued.
pub struct SyncOrchestrator {
    adapter: TableSyncAdapter,
    store: Arc<dyn RelationalStore>,
    index: Arc<dyn VectorIndex>,
    embeddings: Arc<dyn EmbeddingGateway>,
    tables: Vec<SourceTableConfig>,
    metrics: Arc<dyn MetricsRecorder>,
    run_lock: Mutex<()>,
    running: AtomicBool,
    schema_retry: RetryPolicy,
    incremental_retry: RetryPolicy,
    run_budget: Duration,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("tables", &self.tables.len())
            .field("run_budget", &self.run_budget)
            .finish()
    }
}

struct RunGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl SyncOrchestrator {
    pub fn new(
        adapter: TableSyncAdapter,
        store: Arc<dyn RelationalStore>,
        index: Arc<dyn VectorIndex>,
        embeddings: Arc<dyn EmbeddingGateway>,
        tables: Vec<SourceTableConfig>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            adapter,
            store,
            index,
            embeddings,
            tables,
            metrics,
            run_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            schema_retry: RetryPolicy::schema_init(),
            incremental_retry: RetryPolicy::incremental_sync(),
            run_budget: Duration::from_secs(1800),
        }
    }

    pub fn with_run_budget(mut self, budget: Duration) -> Self {
        self.run_budget = budget;
        self
    }

    pub fn capabilities(&self) -> SyncCapabilities {
        SyncCapabilities {
            tables: self.tables.clone(),
            running: self.running.load(Ordering::SeqCst),
            run_budget_secs: self.run_budget.as_secs(),
        }
    }

    /// Full sync: preflight, schema init under retry, then every table.
    /// `force` drops the relational tables first for a clean rebuild.
    pub async fn run_full(&self, force: bool) -> Result<SyncSummary, DomainError> {
        let _guard = self.try_begin()?;
        let started = Instant::now();

        info!(force, tables = self.tables.len(), "Starting full sync");

        if let Err(err) = self.preflight().await {
            error!(error = %err, "Preflight failed, aborting full sync");
            return Ok(self.finish("full", SyncSummary::aborted(&err, ms(started))));
        }

        let schema_result = self
            .schema_retry
            .run("schema init", || async {
                if force {
                    self.store.drop_schema(&self.tables).await?;
                }

                self.store.init_schema(&self.tables).await?;
                self.index.ensure_schema().await
            })
            .await;

        if let Err(err) = schema_result {
            error!(error = %err, "Schema init failed, aborting full sync");
            return Ok(self.finish("full", SyncSummary::aborted(&err, ms(started))));
        }

        let run_started_at = Utc::now();
        let results = self.sync_tables(false, started, run_started_at).await;

        let summary =
            SyncSummary::from_results(results, ms(started), self.store.average_query_time_ms());

        Ok(self.finish("full", summary))
    }

    /// Incremental sync bounded by each table's watermark, the whole attempt
    /// wrapped in the incremental retry policy. A failed table never
    /// advances its watermark, so its records are retried next cycle.
    pub async fn run_incremental(&self) -> Result<SyncSummary, DomainError> {
        let _guard = self.try_begin()?;
        let started = Instant::now();

        info!(tables = self.tables.len(), "Starting incremental sync");

        let attempt = self
            .incremental_retry
            .run("incremental sync", || async {
                self.preflight().await?;

                let run_started_at = Utc::now();
                Ok(self.sync_tables(true, Instant::now(), run_started_at).await)
            })
            .await;

        let summary = match attempt {
            Ok(results) => SyncSummary::from_results(
                results,
                ms(started),
                self.store.average_query_time_ms(),
            ),
            Err(err) => {
                error!(error = %err, "Incremental sync aborted");
                SyncSummary::aborted(&err, ms(started))
            }
        };

        Ok(self.finish("incremental", summary))
    }

    /// Full-style sync of one named source table.
    pub async fn run_one(&self, name: &str) -> Result<SyncSummary, DomainError> {
        let table = self
            .tables
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| DomainError::validation(format!("Unknown database '{}'", name)))?;

        let _guard = self.try_begin()?;
        let started = Instant::now();

        info!(table = %table.name, "Starting single-table sync");

        if let Err(err) = self.preflight().await {
            return Ok(self.finish("table", SyncSummary::aborted(&err, ms(started))));
        }

        let tables = std::slice::from_ref(&table);
        let schema_result = self
            .schema_retry
            .run("schema init", || async {
                self.store.init_schema(tables).await?;
                self.index.ensure_schema().await
            })
            .await;

        if let Err(err) = schema_result {
            return Ok(self.finish("table", SyncSummary::aborted(&err, ms(started))));
        }

        let run_started_at = Utc::now();
        let result = self.adapter.sync_table(&table, None).await;

        if result.succeeded() {
            self.advance_watermark(&table.name, run_started_at).await;
        }

        let summary = SyncSummary::from_results(
            vec![result],
            ms(started),
            self.store.average_query_time_ms(),
        );

        Ok(self.finish("table", summary))
    }

    fn try_begin(&self) -> Result<RunGuard<'_>, DomainError> {
        let lock = self
            .run_lock
            .try_lock()
            .map_err(|_| DomainError::rate_limit("A sync run is already in progress"))?;

        self.running.store(true, Ordering::SeqCst);

        Ok(RunGuard {
            _lock: lock,
            running: &self.running,
        })
    }

    /// Health-gates the run before any expensive work: a known-broken
    /// dependency must not receive partial writes.
    async fn preflight(&self) -> Result<(), DomainError> {
        if !self.store.health_check().await.unwrap_or(false) {
            return Err(DomainError::database("Relational store unhealthy"));
        }

        if !self.index.health_check().await.unwrap_or(false) {
            return Err(DomainError::external_api(
                "vector-index",
                "Vector index unhealthy",
            ));
        }

        if !self.embeddings.health_check().await.unwrap_or(false) {
            return Err(DomainError::external_api(
                "embedding-gateway",
                "Embedding gateway unhealthy",
            ));
        }

        Ok(())
    }

    /// Loops over every configured table. A failure in one table is recorded
    /// in its result and never stops the loop; tables not started before the
    /// run budget elapses are marked skipped.
    async fn sync_tables(
        &self,
        use_watermarks: bool,
        run_started: Instant,
        run_started_at: DateTime<Utc>,
    ) -> Vec<SyncRunResult> {
        let mut results = Vec::with_capacity(self.tables.len());

        for table in &self.tables {
            if run_started.elapsed() >= self.run_budget {
                warn!(table = %table.name, "Run budget elapsed, skipping table");
                results.push(SyncRunResult::skipped(&table.name));
                continue;
            }

            let since = if use_watermarks {
                match self.store.watermark(&table.name).await {
                    Ok(watermark) => watermark,
                    Err(err) => {
                        warn!(
                            table = %table.name,
                            error = %err,
                            "Watermark read failed, falling back to full extraction"
                        );
                        None
                    }
                }
            } else {
                None
            };

            let result = self.adapter.sync_table(table, since).await;

            if result.succeeded() {
                self.advance_watermark(&table.name, run_started_at).await;
            }

            results.push(result);
        }

        results
    }

    /// The watermark moves to the run start, not the run end, so records
    /// modified mid-run are re-extracted next cycle rather than lost.
    async fn advance_watermark(&self, table: &str, to: DateTime<Utc>) {
        if let Err(err) = self.store.set_watermark(table, to).await {
            warn!(table = %table, error = %err, "Failed to advance watermark");
        }
    }

    fn finish(&self, kind: &str, summary: SyncSummary) -> SyncSummary {
        self.metrics.record_sync_run(kind, &summary);

        info!(
            kind = kind,
            status = ?summary.status,
            loaded = summary.total_loaded,
            errors = summary.total_errors,
            duration_ms = summary.duration_ms,
            "Sync run finished"
        );

        summary
    }
}

fn ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NoopMetricsRecorder, SourceRecord, SyncStatus, Visibility};
    use crate::infrastructure::content_source::mock::MockContentSource;
    use crate::infrastructure::gateway::mock::MockEmbeddingGateway;
    use crate::infrastructure::relational::InMemoryRelationalStore;
    use crate::infrastructure::vector_index::InMemoryVectorIndex;

    struct Fixture {
        source: Arc<MockContentSource>,
        store: Arc<InMemoryRelationalStore>,
        index: Arc<InMemoryVectorIndex>,
        embeddings: Arc<MockEmbeddingGateway>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                source: Arc::new(MockContentSource::new()),
                store: Arc::new(InMemoryRelationalStore::new()),
                index: Arc::new(InMemoryVectorIndex::new()),
                embeddings: Arc::new(MockEmbeddingGateway::new()),
            }
        }

        fn orchestrator(&self, tables: Vec<SourceTableConfig>) -> SyncOrchestrator {
            let adapter = TableSyncAdapter::new(
                self.source.clone(),
                self.store.clone(),
                self.index.clone(),
                self.embeddings.clone(),
            );

            SyncOrchestrator::new(
                adapter,
                self.store.clone(),
                self.index.clone(),
                self.embeddings.clone(),
                tables,
                Arc::new(NoopMetricsRecorder),
            )
        }
    }

    fn table(name: &str, collection: &str) -> SourceTableConfig {
        SourceTableConfig::new(name, name, collection, Visibility::Public)
    }

    fn record(id: &str) -> SourceRecord {
        SourceRecord::new(id, format!("Title {}", id), "Body", Utc::now())
    }

    #[tokio::test]
    async fn test_full_sync_success() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a"), record("b")]);

        let orchestrator = f.orchestrator(vec![table("catalog", "col-1")]);
        let summary = orchestrator.run_full(false).await.unwrap();

        assert_eq!(summary.status, SyncStatus::Success);
        assert_eq!(summary.total_extracted, 2);
        assert_eq!(summary.total_loaded, 2);
        assert_eq!(f.store.count_records("catalog").await.unwrap(), 2);
        assert_eq!(f.index.len(), 2);
        assert!(summary.performance.records_per_second >= 0.0);
    }

    #[tokio::test]
    async fn test_full_sync_twice_is_idempotent() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a"), record("b")]);

        let orchestrator = f.orchestrator(vec![table("catalog", "col-1")]);

        let first = orchestrator.run_full(false).await.unwrap();
        assert_eq!(first.status, SyncStatus::Success);
        assert_eq!(first.tables[0].updated, 0);

        let second = orchestrator.run_full(false).await.unwrap();
        assert_eq!(second.status, SyncStatus::Success);
        // Every loaded row on the second run is an update, none are inserts
        assert_eq!(second.tables[0].updated, second.tables[0].loaded);
        assert_eq!(f.store.count_records("catalog").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_one_failing_table_yields_partial() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a")]);
        f.source.seed("col-2", vec![record("b")]);
        f.source.fail_collection("col-3", "source down");

        let orchestrator = f.orchestrator(vec![
            table("catalog", "col-1"),
            table("guides", "col-2"),
            table("notes", "col-3"),
        ]);

        let summary = orchestrator.run_full(false).await.unwrap();

        assert_eq!(summary.status, SyncStatus::Partial);
        assert_eq!(summary.failed_tables, 1);
        assert_eq!(summary.successful_tables, 2);
        // The healthy tables' records made it to the store
        assert_eq!(f.store.count_records("catalog").await.unwrap(), 1);
        assert_eq!(f.store.count_records("guides").await.unwrap(), 1);
        assert_eq!(f.store.count_records("notes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unhealthy_store_aborts_with_zero_writes() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a")]);
        f.store.set_healthy(false);

        let orchestrator = f.orchestrator(vec![table("catalog", "col-1")]);
        let summary = orchestrator.run_full(false).await.unwrap();

        assert_eq!(summary.status, SyncStatus::Failed);
        assert_eq!(summary.error.as_ref().unwrap().error_type, "database");
        assert!(summary.tables.is_empty());
        assert_eq!(f.store.write_count(), 0);
        assert_eq!(f.index.len(), 0);
    }

    #[tokio::test]
    async fn test_unhealthy_gateway_aborts_before_any_table() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a")]);
        f.embeddings.set_unhealthy();

        let orchestrator = f.orchestrator(vec![table("catalog", "col-1")]);
        let summary = orchestrator.run_full(false).await.unwrap();

        assert_eq!(summary.status, SyncStatus::Failed);
        assert_eq!(summary.error.as_ref().unwrap().error_type, "external_api");
        assert_eq!(f.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_budget_skips_all_tables() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a")]);

        let orchestrator = f
            .orchestrator(vec![table("catalog", "col-1")])
            .with_run_budget(Duration::ZERO);

        let summary = orchestrator.run_full(false).await.unwrap();

        assert_eq!(summary.status, SyncStatus::Partial);
        assert_eq!(summary.skipped_tables, 1);
        assert!(summary.tables[0].skipped);
        assert_eq!(f.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_incremental_advances_watermark_only_on_success() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a")]);
        f.source.fail_collection("col-2", "source down");

        let orchestrator =
            f.orchestrator(vec![table("catalog", "col-1"), table("notes", "col-2")]);

        let summary = orchestrator.run_incremental().await.unwrap();
        assert_eq!(summary.status, SyncStatus::Partial);

        assert!(f.store.watermark("catalog").await.unwrap().is_some());
        assert!(f.store.watermark("notes").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incremental_skips_records_behind_watermark() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a")]);

        let orchestrator = f.orchestrator(vec![table("catalog", "col-1")]);

        let first = orchestrator.run_incremental().await.unwrap();
        assert_eq!(first.total_extracted, 1);

        // Nothing changed on the source side, so nothing is re-extracted
        let second = orchestrator.run_incremental().await.unwrap();
        assert_eq!(second.total_extracted, 0);
        assert_eq!(second.status, SyncStatus::Success);

        // A newer record shows up in the next cycle
        let mut fresh = record("b");
        fresh.updated_at = Utc::now() + chrono::Duration::hours(1);
        f.source.seed("col-1", vec![record("a"), fresh]);

        let third = orchestrator.run_incremental().await.unwrap();
        assert_eq!(third.total_extracted, 1);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_rejected() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a")]);

        let orchestrator =
            Arc::new(f.orchestrator(vec![table("catalog", "col-1")]));

        let guard = orchestrator.try_begin().unwrap();
        assert!(orchestrator.capabilities().running);

        let err = orchestrator.run_full(false).await.unwrap_err();
        assert_eq!(err.error_type(), "rate_limit");

        drop(guard);
        assert!(!orchestrator.capabilities().running);
        assert!(orchestrator.run_full(false).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_one_unknown_table() {
        let f = Fixture::new();
        let orchestrator = f.orchestrator(vec![table("catalog", "col-1")]);

        let err = orchestrator.run_one("ghost").await.unwrap_err();
        assert_eq!(err.error_type(), "validation");
    }

    #[tokio::test]
    async fn test_run_one_syncs_only_named_table() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a")]);
        f.source.seed("col-2", vec![record("b")]);

        let orchestrator =
            f.orchestrator(vec![table("catalog", "col-1"), table("guides", "col-2")]);

        let summary = orchestrator.run_one("catalog").await.unwrap();

        assert_eq!(summary.status, SyncStatus::Success);
        assert_eq!(summary.tables.len(), 1);
        assert_eq!(f.store.count_records("catalog").await.unwrap(), 1);
        assert_eq!(f.store.count_records("guides").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_force_full_rebuilds_tables() {
        let f = Fixture::new();
        f.source.seed("col-1", vec![record("a"), record("b")]);

        let orchestrator = f.orchestrator(vec![table("catalog", "col-1")]);
        orchestrator.run_full(false).await.unwrap();

        // The source lost a record; a forced run drops stale rows
        f.source.seed("col-1", vec![record("a")]);
        let summary = orchestrator.run_full(true).await.unwrap();

        assert_eq!(summary.status, SyncStatus::Success);
        assert_eq!(f.store.count_records("catalog").await.unwrap(), 1);
    }
}
