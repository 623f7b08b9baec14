//! Vector index adapter
//!
//! pgvector-backed index for embedded content records, filtered by
//! visibility and source table. An in-memory cosine-similarity index backs
//! development and tests.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::{
    DomainError, VectorMatch, VectorMetadata, VectorQuery, VectorRecord, Visibility,
};

/// Index boundary: upsert embeddings, query by similarity, report health.
#[async_trait]
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    /// Idempotent DDL for the vector table and indexes.
    async fn ensure_schema(&self) -> Result<(), DomainError>;

    /// Upserts records by id; re-sync overwrites, never duplicates.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, DomainError>;

    async fn query(&self, query: VectorQuery) -> Result<Vec<VectorMatch>, DomainError>;

    async fn health_check(&self) -> Result<bool, DomainError>;
}

/// Configuration for the pgvector index table.
#[derive(Debug, Clone)]
pub struct PgvectorIndexConfig {
    pub dimensions: u32,
    pub table_name: String,
}

impl PgvectorIndexConfig {
    pub fn new(dimensions: u32) -> Self {
        Self {
            dimensions,
            table_name: "content_vectors".to_string(),
        }
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }
}

/// pgvector-backed index using cosine distance.
#[derive(Debug)]
pub struct PgvectorIndex {
    pool: PgPool,
    config: PgvectorIndexConfig,
}

impl PgvectorIndex {
    pub fn new(pool: PgPool, config: PgvectorIndexConfig) -> Self {
        Self { pool, config }
    }

    fn embedding_to_pgvector(embedding: &[f32]) -> String {
        let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
        format!("[{}]", values.join(","))
    }

    fn visibility_filter(visibility: &[Visibility]) -> String {
        let values: Vec<String> = visibility
            .iter()
            .map(|v| format!("'{}'", v.as_str()))
            .collect();

        format!("visibility IN ({})", values.join(", "))
    }
}

#[async_trait]
impl VectorIndex for PgvectorIndex {
    async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::database(format!("Failed to create vector extension: {}", e))
            })?;

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id VARCHAR(255) PRIMARY KEY,
                table_name VARCHAR(255) NOT NULL,
                visibility VARCHAR(16) NOT NULL,
                topic VARCHAR(255),
                title TEXT,
                excerpt TEXT NOT NULL,
                embedding vector({dims}) NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            table = self.config.table_name,
            dims = self.config.dimensions
        );

        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to create vector table: {}", e)))?;

        let filter_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_visibility ON {t} (visibility, table_name)",
            t = self.config.table_name
        );

        sqlx::query(&filter_index)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to create filter index: {}", e)))?;

        // IVFFlat needs data to build, so a failure here is not fatal
        let vector_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_embedding ON {t} USING ivfflat (embedding vector_cosine_ops)",
            t = self.config.table_name
        );
        let _ = sqlx::query(&vector_index).execute(&self.pool).await;

        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, DomainError> {
        let mut upserted = 0;

        for record in records {
            let embedding_str = Self::embedding_to_pgvector(&record.embedding);

            let sql = format!(
                r#"
                INSERT INTO {table}
                    (id, table_name, visibility, topic, title, excerpt, embedding, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, '{embedding}'::vector, NOW())
                ON CONFLICT (id) DO UPDATE SET
                    table_name = EXCLUDED.table_name,
                    visibility = EXCLUDED.visibility,
                    topic = EXCLUDED.topic,
                    title = EXCLUDED.title,
                    excerpt = EXCLUDED.excerpt,
                    embedding = EXCLUDED.embedding,
                    updated_at = NOW()
                "#,
                table = self.config.table_name,
                embedding = embedding_str
            );

            sqlx::query(&sql)
                .bind(&record.id)
                .bind(&record.metadata.table)
                .bind(record.metadata.visibility.as_str())
                .bind(&record.metadata.topic)
                .bind(&record.metadata.title)
                .bind(&record.metadata.excerpt)
                .execute(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Vector upsert failed: {}", e)))?;

            upserted += 1;
        }

        Ok(upserted)
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<VectorMatch>, DomainError> {
        let embedding_str = Self::embedding_to_pgvector(&query.embedding);
        let mut filter = Self::visibility_filter(&query.visibility);

        if let Some(table) = &query.table {
            filter.push_str(&format!(" AND table_name = '{}'", table.replace('\'', "''")));
        }

        let sql = format!(
            r#"
            SELECT
                id,
                table_name,
                visibility,
                topic,
                title,
                excerpt,
                embedding <=> '{embedding}' AS distance
            FROM {table}
            WHERE {filter}
            ORDER BY distance
            LIMIT {limit}
            "#,
            embedding = embedding_str,
            table = self.config.table_name,
            filter = filter,
            limit = query.limit
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Vector query failed: {}", e)))?;

        let mut matches = Vec::with_capacity(rows.len());

        for row in rows {
            let distance: f64 = row
                .try_get("distance")
                .map_err(|e| DomainError::database(e.to_string()))?;
            let visibility: String = row
                .try_get("visibility")
                .map_err(|e| DomainError::database(e.to_string()))?;

            let visibility = Visibility::parse(&visibility).ok_or_else(|| {
                DomainError::database(format!("Unknown visibility tag '{}'", visibility))
            })?;

            matches.push(VectorMatch {
                id: row
                    .try_get("id")
                    .map_err(|e| DomainError::database(e.to_string()))?,
                // Cosine distance to similarity
                score: (1.0 - distance) as f32,
                metadata: VectorMetadata {
                    visibility,
                    table: row
                        .try_get("table_name")
                        .map_err(|e| DomainError::database(e.to_string()))?,
                    topic: row.try_get("topic").unwrap_or(None),
                    title: row.try_get("title").unwrap_or(None),
                    excerpt: row.try_get("excerpt").unwrap_or_default(),
                },
            });
        }

        Ok(matches)
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        Ok(sqlx::query("SELECT 1").execute(&self.pool).await.is_ok())
    }
}

/// In-memory index with true cosine scoring, for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    records: std::sync::RwLock<std::collections::BTreeMap<String, VectorRecord>>,
    healthy: std::sync::atomic::AtomicBool,
    failing: std::sync::atomic::AtomicBool,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            healthy: std::sync::atomic::AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy
            .store(healthy, std::sync::atomic::Ordering::SeqCst);
    }

    /// Makes subsequent queries fail, for exercising search degradation.
    pub fn fail_queries(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_schema(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, DomainError> {
        let mut guard = self.records.write().unwrap();
        let count = records.len();

        for record in records {
            guard.insert(record.id.clone(), record);
        }

        Ok(count)
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<VectorMatch>, DomainError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(DomainError::database("vector index unavailable"));
        }

        let guard = self.records.read().unwrap();

        let mut matches: Vec<VectorMatch> = guard
            .values()
            .filter(|r| query.visibility.contains(&r.metadata.visibility))
            .filter(|r| {
                query
                    .table
                    .as_deref()
                    .map_or(true, |t| r.metadata.table == t)
            })
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: Self::cosine_similarity(&query.embedding, &r.embedding),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(query.limit);

        Ok(matches)
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        Ok(self.healthy.load(std::sync::atomic::Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, embedding: Vec<f32>, visibility: Visibility) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            metadata: VectorMetadata {
                visibility,
                table: "catalog".to_string(),
                topic: None,
                title: None,
                excerpt: "...".to_string(),
            },
        }
    }

    #[test]
    fn test_embedding_to_pgvector_literal() {
        assert_eq!(
            PgvectorIndex::embedding_to_pgvector(&[0.5, 1.0, -2.0]),
            "[0.5,1,-2]"
        );
    }

    #[test]
    fn test_visibility_filter_sql() {
        let sql = PgvectorIndex::visibility_filter(&[Visibility::Public, Visibility::Internal]);
        assert_eq!(sql, "visibility IN ('public', 'internal')");
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = InMemoryVectorIndex::new();

        index
            .upsert(vec![record("catalog:a", vec![1.0, 0.0], Visibility::Public)])
            .await
            .unwrap();
        index
            .upsert(vec![record("catalog:a", vec![0.0, 1.0], Visibility::Public)])
            .await
            .unwrap();

        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_query_respects_visibility_scope() {
        let index = InMemoryVectorIndex::new();

        index
            .upsert(vec![
                record("catalog:pub", vec![1.0, 0.0], Visibility::Public),
                record("catalog:int", vec![1.0, 0.1], Visibility::Internal),
            ])
            .await
            .unwrap();

        let matches = index
            .query(VectorQuery::new(vec![1.0, 0.0], 10, vec![Visibility::Public]))
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "catalog:pub");
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = InMemoryVectorIndex::new();

        index
            .upsert(vec![
                record("catalog:far", vec![0.0, 1.0], Visibility::Public),
                record("catalog:near", vec![1.0, 0.05], Visibility::Public),
            ])
            .await
            .unwrap();

        let matches = index
            .query(VectorQuery::new(vec![1.0, 0.0], 10, vec![Visibility::Public]))
            .await
            .unwrap();

        assert_eq!(matches[0].id, "catalog:near");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn test_failing_index_returns_error() {
        let index = InMemoryVectorIndex::new();
        index.fail_queries(true);

        let result = index
            .query(VectorQuery::new(vec![1.0], 10, vec![Visibility::Public]))
            .await;

        assert!(result.is_err());
    }
}
