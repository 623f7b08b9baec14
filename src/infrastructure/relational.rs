//! Relational store adapter
//!
//! Executes parameterized statements against Postgres, instruments query
//! durations, and reports health. An in-memory implementation backs
//! development and tests, mirroring the Postgres/in-memory storage switch
//! used at startup.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::{DomainError, SourceRecord, SourceTableConfig, Visibility};

/// Outcome of one upsert batch: how many rows were newly inserted vs updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub inserted: u64,
    pub updated: u64,
}

impl LoadOutcome {
    /// Rows written, the `loaded` figure reported per table.
    pub fn loaded(&self) -> u64 {
        self.inserted + self.updated
    }
}

/// Storage boundary for synced records and per-table watermarks.
#[async_trait]
pub trait RelationalStore: Send + Sync + std::fmt::Debug {
    /// Idempotent DDL: create-if-not-exists tables and indexes.
    async fn init_schema(&self, tables: &[SourceTableConfig]) -> Result<(), DomainError>;

    /// Drops the per-table data for a forced rebuild. Watermarks survive.
    async fn drop_schema(&self, tables: &[SourceTableConfig]) -> Result<(), DomainError>;

    /// Insert-or-update keyed by the source's stable id, never duplicating.
    async fn upsert_records(
        &self,
        table: &SourceTableConfig,
        records: &[SourceRecord],
    ) -> Result<LoadOutcome, DomainError>;

    async fn fetch_records(&self, table: &str) -> Result<Vec<SourceRecord>, DomainError>;

    async fn count_records(&self, table: &str) -> Result<u64, DomainError>;

    /// Last successful sync point for a table, bounding incremental extraction.
    async fn watermark(&self, table: &str) -> Result<Option<DateTime<Utc>>, DomainError>;

    async fn set_watermark(&self, table: &str, at: DateTime<Utc>) -> Result<(), DomainError>;

    async fn health_check(&self) -> Result<bool, DomainError>;

    /// Mean statement duration since process start, for run summaries.
    fn average_query_time_ms(&self) -> f64;
}

/// Rejects identifiers that cannot be safely interpolated into DDL.
fn checked_identifier(name: &str) -> Result<&str, DomainError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if ok {
        Ok(name)
    } else {
        Err(DomainError::configuration(format!(
            "Invalid table identifier '{}'",
            name
        )))
    }
}

/// Postgres-backed store over a shared connection pool.
#[derive(Debug)]
pub struct PgRelationalStore {
    pool: PgPool,
    query_micros: AtomicU64,
    query_count: AtomicU64,
}

impl PgRelationalStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_micros: AtomicU64::new(0),
            query_count: AtomicU64::new(0),
        }
    }

    fn record_duration(&self, started: std::time::Instant) {
        self.query_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.query_count.fetch_add(1, Ordering::Relaxed);
    }

    async fn execute_ddl(&self, sql: &str) -> Result<(), DomainError> {
        let started = std::time::Instant::now();
        let result = sqlx::query(sql).execute(&self.pool).await;
        self.record_duration(started);

        result
            .map(|_| ())
            .map_err(|e| DomainError::database(format!("DDL failed: {}", e)))
    }
}

#[async_trait]
impl RelationalStore for PgRelationalStore {
    async fn init_schema(&self, tables: &[SourceTableConfig]) -> Result<(), DomainError> {
        for table in tables {
            let name = checked_identifier(&table.target_table)?;

            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {name} (
                    source_id VARCHAR(255) PRIMARY KEY,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    topic VARCHAR(255),
                    visibility VARCHAR(16) NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL,
                    synced_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#
            );
            self.execute_ddl(&ddl).await?;

            let index = format!(
                "CREATE INDEX IF NOT EXISTS idx_{name}_updated_at ON {name} (updated_at)"
            );
            self.execute_ddl(&index).await?;
        }

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS sync_watermarks (
                table_name VARCHAR(255) PRIMARY KEY,
                last_synced_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .await
    }

    async fn drop_schema(&self, tables: &[SourceTableConfig]) -> Result<(), DomainError> {
        for table in tables {
            let name = checked_identifier(&table.target_table)?;
            self.execute_ddl(&format!("DROP TABLE IF EXISTS {name}")).await?;
        }

        Ok(())
    }

    async fn upsert_records(
        &self,
        table: &SourceTableConfig,
        records: &[SourceRecord],
    ) -> Result<LoadOutcome, DomainError> {
        let name = checked_identifier(&table.target_table)?;
        let mut outcome = LoadOutcome::default();

        let sql = format!(
            r#"
            INSERT INTO {name}
                (source_id, title, content, topic, visibility, updated_at, synced_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (source_id) DO UPDATE SET
                title = EXCLUDED.title,
                content = EXCLUDED.content,
                topic = EXCLUDED.topic,
                visibility = EXCLUDED.visibility,
                updated_at = EXCLUDED.updated_at,
                synced_at = NOW()
            RETURNING (xmax = 0) AS inserted
            "#
        );

        for record in records {
            let visibility = record.effective_visibility(table);
            let started = std::time::Instant::now();

            let row = sqlx::query(&sql)
                .bind(&record.source_id)
                .bind(&record.title)
                .bind(&record.content)
                .bind(&record.topic)
                .bind(visibility.as_str())
                .bind(record.updated_at)
                .fetch_one(&self.pool)
                .await;

            self.record_duration(started);

            let row = row.map_err(|e| DomainError::database(format!("Upsert failed: {}", e)))?;
            let inserted: bool = row.try_get("inserted").unwrap_or(false);

            if inserted {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
        }

        Ok(outcome)
    }

    async fn fetch_records(&self, table: &str) -> Result<Vec<SourceRecord>, DomainError> {
        let name = checked_identifier(table)?;
        let sql = format!(
            "SELECT source_id, title, content, topic, visibility, updated_at FROM {name} ORDER BY source_id"
        );

        let started = std::time::Instant::now();
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await;
        self.record_duration(started);

        let rows = rows.map_err(|e| DomainError::database(format!("Fetch failed: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let mut record = SourceRecord::new(
                    row.try_get::<String, _>("source_id")
                        .map_err(|e| DomainError::database(e.to_string()))?,
                    row.try_get::<String, _>("title")
                        .map_err(|e| DomainError::database(e.to_string()))?,
                    row.try_get::<String, _>("content")
                        .map_err(|e| DomainError::database(e.to_string()))?,
                    row.try_get::<DateTime<Utc>, _>("updated_at")
                        .map_err(|e| DomainError::database(e.to_string()))?,
                );

                if let Ok(Some(topic)) = row.try_get::<Option<String>, _>("topic") {
                    record = record.with_topic(topic);
                }

                if let Some(visibility) = row
                    .try_get::<String, _>("visibility")
                    .ok()
                    .as_deref()
                    .and_then(Visibility::parse)
                {
                    record = record.with_visibility(visibility);
                }

                Ok(record)
            })
            .collect()
    }

    async fn count_records(&self, table: &str) -> Result<u64, DomainError> {
        let name = checked_identifier(table)?;

        let started = std::time::Instant::now();
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {name}"))
            .fetch_one(&self.pool)
            .await;
        self.record_duration(started);

        let row = row.map_err(|e| DomainError::database(format!("Count failed: {}", e)))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| DomainError::database(e.to_string()))?;

        Ok(n as u64)
    }

    async fn watermark(&self, table: &str) -> Result<Option<DateTime<Utc>>, DomainError> {
        let started = std::time::Instant::now();
        let row = sqlx::query(
            "SELECT last_synced_at FROM sync_watermarks WHERE table_name = $1",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await;
        self.record_duration(started);

        let row = row.map_err(|e| DomainError::database(format!("Watermark read failed: {}", e)))?;

        row.map(|r| {
            r.try_get::<DateTime<Utc>, _>("last_synced_at")
                .map_err(|e| DomainError::database(e.to_string()))
        })
        .transpose()
    }

    async fn set_watermark(&self, table: &str, at: DateTime<Utc>) -> Result<(), DomainError> {
        let started = std::time::Instant::now();
        let result = sqlx::query(
            r#"
            INSERT INTO sync_watermarks (table_name, last_synced_at)
            VALUES ($1, $2)
            ON CONFLICT (table_name) DO UPDATE SET last_synced_at = EXCLUDED.last_synced_at
            "#,
        )
        .bind(table)
        .bind(at)
        .execute(&self.pool)
        .await;
        self.record_duration(started);

        result
            .map(|_| ())
            .map_err(|e| DomainError::database(format!("Watermark write failed: {}", e)))
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        let started = std::time::Instant::now();
        let result = sqlx::query("SELECT 1").execute(&self.pool).await;
        self.record_duration(started);

        Ok(result.is_ok())
    }

    fn average_query_time_ms(&self) -> f64 {
        let count = self.query_count.load(Ordering::Relaxed);

        if count == 0 {
            return 0.0;
        }

        self.query_micros.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
    }
}

/// In-memory store for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryRelationalStore {
    tables: std::sync::RwLock<
        std::collections::HashMap<String, std::collections::BTreeMap<String, SourceRecord>>,
    >,
    watermarks: std::sync::RwLock<std::collections::HashMap<String, DateTime<Utc>>>,
    healthy: AtomicBool,
    writes: AtomicU64,
    query_micros: AtomicU64,
    query_count: AtomicU64,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Flips the health probe, for exercising preflight gating.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of record writes issued since construction.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn track(&self, started: std::time::Instant) {
        self.query_micros
            .fetch_add(started.elapsed().as_micros().max(1) as u64, Ordering::Relaxed);
        self.query_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn init_schema(&self, tables: &[SourceTableConfig]) -> Result<(), DomainError> {
        let started = std::time::Instant::now();
        let mut guard = self.tables.write().unwrap();

        for table in tables {
            guard.entry(table.target_table.clone()).or_default();
        }

        drop(guard);
        self.track(started);
        Ok(())
    }

    async fn drop_schema(&self, tables: &[SourceTableConfig]) -> Result<(), DomainError> {
        let mut guard = self.tables.write().unwrap();

        for table in tables {
            guard.remove(&table.target_table);
        }

        Ok(())
    }

    async fn upsert_records(
        &self,
        table: &SourceTableConfig,
        records: &[SourceRecord],
    ) -> Result<LoadOutcome, DomainError> {
        let started = std::time::Instant::now();
        let mut guard = self.tables.write().unwrap();
        let rows = guard.entry(table.target_table.clone()).or_default();
        let mut outcome = LoadOutcome::default();

        for record in records {
            let mut stored = record.clone();
            stored.visibility = Some(record.effective_visibility(table));

            if rows.insert(stored.source_id.clone(), stored).is_some() {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }

            self.writes.fetch_add(1, Ordering::SeqCst);
        }

        drop(guard);
        self.track(started);
        Ok(outcome)
    }

    async fn fetch_records(&self, table: &str) -> Result<Vec<SourceRecord>, DomainError> {
        let guard = self.tables.read().unwrap();

        Ok(guard
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn count_records(&self, table: &str) -> Result<u64, DomainError> {
        let guard = self.tables.read().unwrap();
        Ok(guard.get(table).map(|rows| rows.len() as u64).unwrap_or(0))
    }

    async fn watermark(&self, table: &str) -> Result<Option<DateTime<Utc>>, DomainError> {
        Ok(self.watermarks.read().unwrap().get(table).copied())
    }

    async fn set_watermark(&self, table: &str, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.watermarks
            .write()
            .unwrap()
            .insert(table.to_string(), at);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        Ok(self.healthy.load(Ordering::SeqCst))
    }

    fn average_query_time_ms(&self) -> f64 {
        let count = self.query_count.load(Ordering::Relaxed);

        if count == 0 {
            return 0.0;
        }

        self.query_micros.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SourceTableConfig {
        SourceTableConfig::new("catalog", "catalog", "col-1", Visibility::Public)
    }

    fn record(id: &str) -> SourceRecord {
        SourceRecord::new(id, format!("Title {}", id), "Body", Utc::now())
    }

    #[test]
    fn test_checked_identifier() {
        assert!(checked_identifier("catalog").is_ok());
        assert!(checked_identifier("internal_notes").is_ok());
        assert!(checked_identifier("Catalog").is_err());
        assert!(checked_identifier("drop table; --").is_err());
        assert!(checked_identifier("").is_err());
    }

    #[tokio::test]
    async fn test_upsert_distinguishes_inserts_from_updates() {
        let store = InMemoryRelationalStore::new();
        let table = catalog();
        store.init_schema(&[table.clone()]).await.unwrap();

        let outcome = store
            .upsert_records(&table, &[record("a"), record("b")])
            .await
            .unwrap();
        assert_eq!(outcome, LoadOutcome { inserted: 2, updated: 0 });

        let outcome = store
            .upsert_records(&table, &[record("a"), record("c")])
            .await
            .unwrap();
        assert_eq!(outcome, LoadOutcome { inserted: 1, updated: 1 });

        assert_eq!(store.count_records("catalog").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upsert_applies_table_visibility_default() {
        let store = InMemoryRelationalStore::new();
        let table = catalog();

        store
            .upsert_records(
                &table,
                &[
                    record("a"),
                    record("b").with_visibility(Visibility::Internal),
                ],
            )
            .await
            .unwrap();

        let rows = store.fetch_records("catalog").await.unwrap();
        assert_eq!(rows[0].visibility, Some(Visibility::Public));
        assert_eq!(rows[1].visibility, Some(Visibility::Internal));
    }

    #[tokio::test]
    async fn test_watermark_roundtrip() {
        let store = InMemoryRelationalStore::new();
        assert!(store.watermark("catalog").await.unwrap().is_none());

        let at = Utc::now();
        store.set_watermark("catalog", at).await.unwrap();
        assert_eq!(store.watermark("catalog").await.unwrap(), Some(at));
    }

    #[tokio::test]
    async fn test_health_toggle_and_write_counter() {
        let store = InMemoryRelationalStore::new();
        assert!(store.health_check().await.unwrap());

        store.set_healthy(false);
        assert!(!store.health_check().await.unwrap());

        assert_eq!(store.write_count(), 0);
        store
            .upsert_records(&catalog(), &[record("a")])
            .await
            .unwrap();
        assert_eq!(store.write_count(), 1);
    }
}
