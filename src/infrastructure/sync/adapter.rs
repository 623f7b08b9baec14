//! Per-table sync: extract from the content source, load into the
//! relational store, embed and index

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::{
    with_timeout, DomainError, EmbeddingGateway, SourceRecord, SourceTableConfig, SyncRunResult,
    VectorMetadata, VectorRecord,
};
use crate::infrastructure::content_source::ContentSource;
use crate::infrastructure::relational::{LoadOutcome, RelationalStore};
use crate::infrastructure::vector_index::VectorIndex;

/// Longest excerpt stored alongside a vector.
const EXCERPT_LEN: usize = 300;

/// Records embedded per gateway call.
const DEFAULT_EMBED_BATCH: usize = 32;

/// Outcome of the embed-and-index step.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbedOutcome {
    pub indexed: u64,
    pub errors: u64,
}

/// Knows the source schema, the target table, and its visibility class;
/// moves one table's records through extract, load, and index.
pub struct TableSyncAdapter {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn RelationalStore>,
    index: Arc<dyn VectorIndex>,
    embeddings: Arc<dyn EmbeddingGateway>,
    embed_batch_size: usize,
    call_timeout: Duration,
}

impl std::fmt::Debug for TableSyncAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSyncAdapter")
            .field("embed_batch_size", &self.embed_batch_size)
            .finish()
    }
}

impl TableSyncAdapter {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn RelationalStore>,
        index: Arc<dyn VectorIndex>,
        embeddings: Arc<dyn EmbeddingGateway>,
    ) -> Self {
        Self {
            source,
            store,
            index,
            embeddings,
            embed_batch_size: DEFAULT_EMBED_BATCH,
            call_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Pulls every page from the source. Side-effect-free; bounded to
    /// records newer than `since` when given.
    pub async fn extract(
        &self,
        table: &SourceTableConfig,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SourceRecord>, DomainError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = with_timeout(
                "source extract",
                self.call_timeout,
                self.source
                    .fetch_page(&table.source_collection_id, since, cursor.as_deref()),
            )
            .await?;

            records.extend(page.records);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    /// Upserts extracted records keyed by their stable source id.
    pub async fn load(
        &self,
        table: &SourceTableConfig,
        records: &[SourceRecord],
    ) -> Result<LoadOutcome, DomainError> {
        with_timeout(
            "relational load",
            self.call_timeout,
            self.store.upsert_records(table, records),
        )
        .await
    }

    /// Embeds records in batches and upserts the vectors with the table's
    /// visibility tag. A batch whose embedding call fails is skipped and
    /// counted, not retried within this run.
    pub async fn embed_and_index(
        &self,
        table: &SourceTableConfig,
        records: &[SourceRecord],
    ) -> Result<EmbedOutcome, DomainError> {
        let mut outcome = EmbedOutcome::default();

        for batch in records.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch
                .iter()
                .map(|r| format!("{}\n{}", r.title, r.content))
                .collect();

            let vectors = match with_timeout(
                "embed batch",
                self.call_timeout,
                self.embeddings.embed(texts),
            )
            .await
            {
                Ok(vectors) => vectors,
                Err(err) => {
                    warn!(
                        table = %table.name,
                        batch = batch.len(),
                        error = %err,
                        "Embedding batch failed, skipping records"
                    );

                    outcome.errors += batch.len() as u64;
                    continue;
                }
            };

            if vectors.len() != batch.len() {
                warn!(
                    table = %table.name,
                    expected = batch.len(),
                    got = vectors.len(),
                    "Embedding count mismatch, skipping batch"
                );

                outcome.errors += batch.len() as u64;
                continue;
            }

            let vector_records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(record, embedding)| VectorRecord {
                    id: VectorRecord::vector_id(&table.name, &record.source_id),
                    embedding,
                    metadata: VectorMetadata {
                        visibility: record.effective_visibility(table),
                        table: table.name.clone(),
                        topic: record.topic.clone(),
                        title: Some(record.title.clone()),
                        excerpt: excerpt_of(&record.content),
                    },
                })
                .collect();

            let upserted = with_timeout(
                "vector upsert",
                self.call_timeout,
                self.index.upsert(vector_records),
            )
            .await?;

            outcome.indexed += upserted as u64;
        }

        Ok(outcome)
    }

    /// Syncs one table end to end, folding every failure into the result.
    /// Extraction happens-before load happens-before indexing.
    pub async fn sync_table(
        &self,
        table: &SourceTableConfig,
        since: Option<DateTime<Utc>>,
    ) -> SyncRunResult {
        let started = Instant::now();
        let mut result = SyncRunResult {
            table: table.name.clone(),
            extracted: 0,
            loaded: 0,
            updated: 0,
            errors: 0,
            duration_ms: 0,
            skipped: false,
        };

        let records = match self.extract(table, since).await {
            Ok(records) => records,
            Err(err) => {
                warn!(table = %table.name, error = %err, "Extraction failed");
                result.errors += 1;
                result.duration_ms = started.elapsed().as_millis() as u64;
                return result;
            }
        };

        result.extracted = records.len() as u64;

        if records.is_empty() {
            result.duration_ms = started.elapsed().as_millis() as u64;
            return result;
        }

        match self.load(table, &records).await {
            Ok(outcome) => {
                result.loaded = outcome.loaded();
                result.updated = outcome.updated;
            }
            Err(err) => {
                warn!(table = %table.name, error = %err, "Load failed");
                result.errors += 1;
                result.duration_ms = started.elapsed().as_millis() as u64;
                return result;
            }
        }

        match self.embed_and_index(table, &records).await {
            Ok(outcome) => {
                result.errors += outcome.errors;

                info!(
                    table = %table.name,
                    extracted = result.extracted,
                    loaded = result.loaded,
                    indexed = outcome.indexed,
                    errors = result.errors,
                    "Table sync finished"
                );
            }
            Err(err) => {
                warn!(table = %table.name, error = %err, "Indexing failed");
                result.errors += 1;
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }
}

fn excerpt_of(content: &str) -> String {
    if content.chars().count() <= EXCERPT_LEN {
        return content.to_string();
    }

    content.chars().take(EXCERPT_LEN).collect()
}
