//! Semantic search over the vector index, fronted by the cache store

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::domain::{
    search_cache_key, ChatMessage, CompletionGateway, DomainError, EmbeddingGateway,
    MetricsRecorder, PersonaContext, PersonaRegistry, SearchFacets, SearchOutcome, SearchParams,
    SearchResultItem, VectorQuery, with_timeout,
};
use crate::infrastructure::cache::store::CacheStore;
use crate::infrastructure::vector_index::VectorIndex;

/// Cache of finished search outcomes, keyed by the canonical parameter tuple.
pub type SearchCache = CacheStore<SearchOutcome>;

/// A search answer plus whether it came from the cache.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub outcome: SearchOutcome,
    pub cached: bool,
}

/// Serves relevance-ranked context for chat requests.
pub struct SemanticSearchService {
    embeddings: Arc<dyn EmbeddingGateway>,
    completions: Option<Arc<dyn CompletionGateway>>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<SearchCache>,
    personas: Arc<PersonaRegistry>,
    metrics: Arc<dyn MetricsRecorder>,
    cache_ttl: Duration,
    call_timeout: Duration,
}

impl std::fmt::Debug for SemanticSearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticSearchService")
            .field("rerank_enabled", &self.completions.is_some())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl SemanticSearchService {
    pub fn new(
        embeddings: Arc<dyn EmbeddingGateway>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<SearchCache>,
        personas: Arc<PersonaRegistry>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            embeddings,
            completions: None,
            index,
            cache,
            personas,
            metrics,
            cache_ttl: Duration::from_secs(600),
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Enables result annotation through the completion gateway.
    pub fn with_completions(mut self, completions: Arc<dyn CompletionGateway>) -> Self {
        self.completions = Some(completions);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Answers a search request, consulting the cache first. Validation
    /// failures are returned to the caller; everything else degrades to an
    /// empty result set.
    pub async fn search(&self, params: &SearchParams) -> Result<SearchHit, DomainError> {
        params.validate()?;
        let persona = self.personas.resolve(&params.persona)?.clone();

        let key = search_cache_key(params);
        let lookup_started = Instant::now();

        if let Some(outcome) = self.cache.get(&key) {
            self.metrics.record_cache_hit(lookup_started.elapsed());

            debug!(
                query = %params.query,
                persona = %params.persona,
                results = outcome.results.len(),
                "Search served from cache"
            );

            return Ok(SearchHit {
                outcome,
                cached: true,
            });
        }

        self.metrics.record_cache_miss();
        let outcome = self.retrieve_and_cache(params, &persona, &key).await;

        Ok(SearchHit {
            outcome,
            cached: false,
        })
    }

    /// Runs the full retrieval path regardless of any cached entry; the
    /// cache-warming path.
    pub async fn refresh(&self, params: &SearchParams) -> Result<(), DomainError> {
        params.validate()?;
        let persona = self.personas.resolve(&params.persona)?.clone();

        let key = search_cache_key(params);
        self.retrieve_and_cache(params, &persona, &key).await;

        Ok(())
    }

    async fn retrieve_and_cache(
        &self,
        params: &SearchParams,
        persona: &PersonaContext,
        key: &str,
    ) -> SearchOutcome {
        let outcome = match self.retrieve(params, persona).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    query = %params.query,
                    error = %err,
                    "Retrieval failed, degrading to empty result set"
                );

                SearchOutcome::empty()
            }
        };

        self.cache.set(key, outcome.clone(), self.cache_ttl);
        outcome
    }

    async fn retrieve(
        &self,
        params: &SearchParams,
        persona: &PersonaContext,
    ) -> Result<SearchOutcome, DomainError> {
        let vectors = with_timeout(
            "embed query",
            self.call_timeout,
            self.embeddings.embed(vec![params.query.clone()]),
        )
        .await?;

        let embedding = vectors.into_iter().next().ok_or_else(|| {
            DomainError::external_api("embedding-gateway", "No embedding returned for query")
        })?;

        // Over-fetch so threshold filtering still leaves enough candidates
        let query = VectorQuery::new(
            embedding,
            params.limit * 2,
            persona.visibility_scope.clone(),
        );

        let matches = with_timeout("vector query", self.call_timeout, self.index.query(query))
            .await?;

        let mut results: Vec<SearchResultItem> = matches
            .into_iter()
            .filter(|m| m.score >= params.score_threshold)
            .map(|m| SearchResultItem {
                id: m.id,
                title: m.metadata.title,
                excerpt: m.metadata.excerpt,
                table: m.metadata.table,
                topic: m.metadata.topic,
                score: m.score,
                insight: None,
            })
            .collect();

        results.truncate(params.limit);

        if let Some(completions) = &self.completions {
            self.annotate(completions.as_ref(), params, &mut results)
                .await;
        }

        let facets = SearchFacets::from_results(&results);

        Ok(SearchOutcome { results, facets })
    }

    /// Asks the completion gateway for one insight line per result. Failures
    /// leave the unannotated results untouched.
    async fn annotate(
        &self,
        completions: &dyn CompletionGateway,
        params: &SearchParams,
        results: &mut [SearchResultItem],
    ) {
        if results.is_empty() {
            return;
        }

        let listing: String = results
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "{}. [{}] {}\n{}\n",
                    i + 1,
                    r.table,
                    r.title.as_deref().unwrap_or("(untitled)"),
                    r.excerpt
                )
            })
            .collect();

        let messages = vec![
            ChatMessage::system(
                "For each numbered search result, write one short line on why it matters \
                 for the query. Answer with one line per result, formatted as `N: insight`.",
            ),
            ChatMessage::user(format!("Query: {}\n\nResults:\n{}", params.query, listing)),
        ];

        let reply = match with_timeout(
            "rerank completion",
            self.call_timeout,
            completions.complete(messages),
        )
        .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "Result annotation failed, returning unranked results");
                return;
            }
        };

        for line in reply.lines() {
            let Some((index, insight)) = line.split_once(':') else {
                continue;
            };

            let Ok(index) = index.trim().trim_start_matches(|c: char| !c.is_ascii_digit()).parse::<usize>() else {
                continue;
            };

            if index >= 1 && index <= results.len() {
                results[index - 1].insight = Some(insight.trim().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NoopMetricsRecorder, Visibility, VectorMetadata, VectorRecord};
    use crate::infrastructure::gateway::mock::{MockCompletionGateway, MockEmbeddingGateway};
    use crate::infrastructure::vector_index::InMemoryVectorIndex;

    async fn seeded_index() -> Arc<InMemoryVectorIndex> {
        let index = Arc::new(InMemoryVectorIndex::new());
        let records = vec![
            ("catalog:pub", "catalog", Visibility::Public, "catalog entry"),
            ("catalog:int", "catalog", Visibility::Internal, "catalog entry"),
            ("guides:a", "guides", Visibility::Public, "guide text"),
        ];

        for (id, table, visibility, text) in records {
            let record = VectorRecord {
                id: id.to_string(),
                embedding: MockEmbeddingGateway::vector_for(text),
                metadata: VectorMetadata {
                    visibility,
                    table: table.to_string(),
                    topic: Some("ai".to_string()),
                    title: Some(id.to_string()),
                    excerpt: text.to_string(),
                },
            };

            index.upsert(vec![record]).await.unwrap();
        }

        index
    }

    fn service(
        index: Arc<InMemoryVectorIndex>,
        embeddings: Arc<MockEmbeddingGateway>,
    ) -> SemanticSearchService {
        let personas = Arc::new(PersonaRegistry::new(vec![
            PersonaContext::new("public", vec![Visibility::Public]),
            PersonaContext::new("internal", vec![Visibility::Public, Visibility::Internal]),
        ]));

        SemanticSearchService::new(
            embeddings,
            index,
            Arc::new(SearchCache::new(100)),
            personas,
            Arc::new(NoopMetricsRecorder),
        )
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let svc = service(seeded_index().await, embeddings.clone());
        let params = SearchParams::new("catalog entry", "public", 5, 0.0);

        let first = svc.search(&params).await.unwrap();
        assert!(!first.cached);
        assert!(!first.outcome.results.is_empty());

        let second = svc.search(&params).await.unwrap();
        assert!(second.cached);
        assert_eq!(
            second.outcome.results.len(),
            first.outcome.results.len()
        );

        // The hit path never re-embeds
        assert_eq!(embeddings.call_count(), 1);
    }

    #[tokio::test]
    async fn test_persona_scopes_visibility() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let svc = service(seeded_index().await, embeddings);

        let public = svc
            .search(&SearchParams::new("catalog entry", "public", 10, 0.0))
            .await
            .unwrap();
        assert!(public
            .outcome
            .results
            .iter()
            .all(|r| r.id != "catalog:int"));

        let internal = svc
            .search(&SearchParams::new("catalog entry", "internal", 10, 0.0))
            .await
            .unwrap();
        assert!(internal
            .outcome
            .results
            .iter()
            .any(|r| r.id == "catalog:int"));
    }

    #[tokio::test]
    async fn test_threshold_filters_and_limit_truncates() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let svc = service(seeded_index().await, embeddings);

        let strict = svc
            .search(&SearchParams::new("catalog entry", "public", 10, 0.999))
            .await
            .unwrap();
        assert!(strict
            .outcome
            .results
            .iter()
            .all(|r| r.score >= 0.999));

        let limited = svc
            .search(&SearchParams::new("catalog entry", "public", 1, 0.0))
            .await
            .unwrap();
        assert_eq!(limited.outcome.results.len(), 1);
    }

    #[tokio::test]
    async fn test_index_failure_degrades_to_empty() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let index = seeded_index().await;
        index.fail_queries(true);
        let svc = service(index, embeddings);

        let hit = svc
            .search(&SearchParams::new("ai ethics", "public", 10, 0.7))
            .await
            .unwrap();

        assert!(!hit.cached);
        assert!(hit.outcome.results.is_empty());
        assert!(hit.outcome.facets.by_table.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_empty() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        embeddings.fail(true);
        let svc = service(seeded_index().await, embeddings);

        let hit = svc
            .search(&SearchParams::new("anything", "public", 10, 0.0))
            .await
            .unwrap();

        assert!(hit.outcome.results.is_empty());
    }

    #[tokio::test]
    async fn test_validation_touches_nothing() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let svc = service(seeded_index().await, embeddings.clone());

        let err = svc
            .search(&SearchParams::new("", "public", 10, 0.0))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "validation");

        let err = svc
            .search(&SearchParams::new("x".repeat(501), "public", 10, 0.0))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "validation");

        assert_eq!(embeddings.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_persona_rejected() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let svc = service(seeded_index().await, embeddings);

        let err = svc
            .search(&SearchParams::new("catalog", "ghost", 10, 0.0))
            .await
            .unwrap_err();

        assert_eq!(err.error_type(), "validation");
    }

    #[tokio::test]
    async fn test_annotation_applied_per_result() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let completions = Arc::new(MockCompletionGateway::new(
            "1: highly relevant\n2: background reading",
        ));
        let svc =
            service(seeded_index().await, embeddings).with_completions(completions);

        let hit = svc
            .search(&SearchParams::new("catalog entry", "internal", 2, 0.0))
            .await
            .unwrap();

        assert_eq!(
            hit.outcome.results[0].insight.as_deref(),
            Some("highly relevant")
        );
        assert_eq!(
            hit.outcome.results[1].insight.as_deref(),
            Some("background reading")
        );
    }

    #[tokio::test]
    async fn test_annotation_failure_falls_back_to_unranked() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let completions = Arc::new(MockCompletionGateway::new("unused"));
        completions.fail(true);
        let svc =
            service(seeded_index().await, embeddings).with_completions(completions.clone());

        let hit = svc
            .search(&SearchParams::new("catalog entry", "public", 5, 0.0))
            .await
            .unwrap();

        assert!(!hit.outcome.results.is_empty());
        assert!(hit.outcome.results.iter().all(|r| r.insight.is_none()));
        assert_eq!(completions.call_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_hit_short_circuit() {
        let embeddings = Arc::new(MockEmbeddingGateway::new());
        let svc = service(seeded_index().await, embeddings.clone());
        let params = SearchParams::new("catalog entry", "public", 5, 0.0);

        svc.search(&params).await.unwrap();
        assert_eq!(embeddings.call_count(), 1);

        svc.refresh(&params).await.unwrap();
        assert_eq!(embeddings.call_count(), 2);

        // The refreshed entry still serves hits
        let hit = svc.search(&params).await.unwrap();
        assert!(hit.cached);
    }
}
