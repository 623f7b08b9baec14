//! Sync run results and aggregate summaries

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Outcome of syncing one source table in one run. Created by the sync
/// adapter, aggregated into a [`SyncSummary`], never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunResult {
    pub table: String,
    pub extracted: u64,
    pub loaded: u64,
    pub updated: u64,
    pub errors: u64,
    pub duration_ms: u64,
    /// Table was never attempted because the run budget elapsed
    #[serde(default)]
    pub skipped: bool,
}

impl SyncRunResult {
    pub fn skipped(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            extracted: 0,
            loaded: 0,
            updated: 0,
            errors: 0,
            duration_ms: 0,
            skipped: true,
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.skipped && self.errors == 0
    }

    pub fn failed(&self) -> bool {
        !self.skipped && self.errors > 0
    }
}

/// Aggregate status of one orchestrator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Partial,
    Failed,
}

/// Throughput figures for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPerformance {
    pub records_per_second: f64,
    pub average_db_time_ms: f64,
}

/// Fatal precondition that aborted a run before any table was touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAbort {
    pub error_type: String,
    pub message: String,
}

/// Aggregate of all per-table results for one orchestrator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub status: SyncStatus,
    pub total_extracted: u64,
    pub total_loaded: u64,
    pub total_errors: u64,
    pub successful_tables: u64,
    pub failed_tables: u64,
    pub skipped_tables: u64,
    pub tables: Vec<SyncRunResult>,
    pub performance: SyncPerformance,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncAbort>,
}

impl SyncSummary {
    /// Aggregates per-table results once all table tasks have completed.
    ///
    /// Status invariants: `success` iff every attempted table finished with
    /// zero errors and nothing was skipped; `failed` iff every attempted
    /// table failed; `partial` otherwise (mixed outcomes, or a run budget
    /// that elapsed before all tables were attempted).
    pub fn from_results(
        tables: Vec<SyncRunResult>,
        duration_ms: u64,
        average_db_time_ms: f64,
    ) -> Self {
        let successful_tables = tables.iter().filter(|t| t.succeeded()).count() as u64;
        let failed_tables = tables.iter().filter(|t| t.failed()).count() as u64;
        let skipped_tables = tables.iter().filter(|t| t.skipped).count() as u64;

        let total_extracted = tables.iter().map(|t| t.extracted).sum();
        let total_loaded: u64 = tables.iter().map(|t| t.loaded).sum();
        let total_errors = tables.iter().map(|t| t.errors).sum();

        let status = if failed_tables == 0 && skipped_tables == 0 {
            SyncStatus::Success
        } else if successful_tables == 0 && skipped_tables == 0 {
            SyncStatus::Failed
        } else {
            SyncStatus::Partial
        };

        let duration_secs = duration_ms as f64 / 1000.0;
        let records_per_second = if duration_secs > 0.0 {
            total_loaded as f64 / duration_secs
        } else {
            0.0
        };

        Self {
            status,
            total_extracted,
            total_loaded,
            total_errors,
            successful_tables,
            failed_tables,
            skipped_tables,
            tables,
            performance: SyncPerformance {
                records_per_second,
                average_db_time_ms,
            },
            duration_ms,
            error: None,
        }
    }

    /// Summary for a run aborted by a fatal precondition (health check or
    /// schema init). No table was attempted, no write was issued.
    pub fn aborted(error: &DomainError, duration_ms: u64) -> Self {
        Self {
            status: SyncStatus::Failed,
            total_extracted: 0,
            total_loaded: 0,
            total_errors: 0,
            successful_tables: 0,
            failed_tables: 0,
            skipped_tables: 0,
            tables: Vec::new(),
            performance: SyncPerformance {
                records_per_second: 0.0,
                average_db_time_ms: 0.0,
            },
            duration_ms,
            error: Some(SyncAbort {
                error_type: error.error_type().to_string(),
                message: error.to_string(),
            }),
        }
    }
}
