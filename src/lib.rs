//! Portal Content Pipeline
//!
//! Content synchronization and retrieval for a multi-tenant chat portal:
//! - extracts structured records from the content-management service
//! - loads them into a relational store and embeds them into a vector index
//! - serves relevance-ranked semantic search through a bounded TTL/LRU cache

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use api::state::AppState;
use domain::{
    CompletionGateway, EmbeddingGateway, MetricsRecorder, NoopMetricsRecorder, PersonaContext,
    PersonaRegistry, SourceTableConfig, Visibility,
};
use infrastructure::relational::RelationalStore;
use infrastructure::vector_index::VectorIndex;
use infrastructure::{
    CacheOptimizer, HttpClient, HttpContentSource, InMemoryRelationalStore, InMemoryVectorIndex,
    OpenAiGateway, PgRelationalStore, PgvectorIndex, PgvectorIndexConfig,
    PrometheusMetricsRecorder, SearchCache, SemanticSearchService, SyncOrchestrator,
    TableSyncAdapter,
};

/// Everything the serve command needs: handler state plus concrete handles
/// for the background tasks.
pub struct AppServices {
    pub state: AppState,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub optimizer: Arc<CacheOptimizer>,
}

/// Create all services with the given configuration.
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppServices> {
    let metrics: Arc<dyn MetricsRecorder> = if config.metrics.enabled {
        Arc::new(PrometheusMetricsRecorder)
    } else {
        Arc::new(NoopMetricsRecorder)
    };

    let call_timeout = Duration::from_secs(config.sync.call_timeout_secs);

    // Embedding/completion gateway
    let gateway_key = std::env::var("GATEWAY_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .unwrap_or_else(|_| "sk-placeholder".to_string());

    let gateway = Arc::new(
        OpenAiGateway::with_base_url(
            HttpClient::with_timeout("gateway", call_timeout),
            gateway_key,
            &config.gateway.base_url,
        )
        .with_embedding_model(&config.gateway.embedding_model)
        .with_completion_model(&config.gateway.completion_model),
    );

    let embeddings: Arc<dyn EmbeddingGateway> = gateway.clone();
    let completions: Arc<dyn CompletionGateway> = gateway;

    // Content-management service client
    let source_token =
        std::env::var("SOURCE_API_TOKEN").unwrap_or_else(|_| "placeholder".to_string());

    let source = Arc::new(
        HttpContentSource::new(
            HttpClient::with_timeout("content-source", call_timeout),
            &config.source.base_url,
            source_token,
        )
        .with_page_size(config.source.page_size),
    );

    // Storage backend: Postgres when DATABASE_URL is set, in-memory otherwise
    let (store, index): (Arc<dyn RelationalStore>, Arc<dyn VectorIndex>) =
        match std::env::var("DATABASE_URL") {
            Ok(url) => {
                info!("Connecting to PostgreSQL...");
                let pool = sqlx::PgPool::connect(&url)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to PostgreSQL: {}", e))?;
                info!("PostgreSQL connection established");

                let vector_config = PgvectorIndexConfig::new(config.vector.dimensions)
                    .with_table_name(&config.vector.table_name);

                (
                    Arc::new(PgRelationalStore::new(pool.clone())),
                    Arc::new(PgvectorIndex::new(pool, vector_config)),
                )
            }
            Err(_) => {
                info!("DATABASE_URL not set, using in-memory storage");
                (
                    Arc::new(InMemoryRelationalStore::new()),
                    Arc::new(InMemoryVectorIndex::new()),
                )
            }
        };

    let tables = default_source_tables();
    let personas = Arc::new(PersonaRegistry::new(default_personas()));

    // Sync orchestration
    let adapter = TableSyncAdapter::new(
        source,
        store.clone(),
        index.clone(),
        embeddings.clone(),
    )
    .with_embed_batch_size(config.sync.embed_batch_size)
    .with_call_timeout(call_timeout);

    let orchestrator = Arc::new(
        SyncOrchestrator::new(
            adapter,
            store.clone(),
            index.clone(),
            embeddings.clone(),
            tables,
            metrics.clone(),
        )
        .with_run_budget(Duration::from_secs(config.sync.run_budget_secs)),
    );

    // Search path
    let cache = Arc::new(SearchCache::new(config.cache.max_size));

    let mut search = SemanticSearchService::new(
        embeddings.clone(),
        index.clone(),
        cache.clone(),
        personas,
        metrics.clone(),
    )
    .with_cache_ttl(Duration::from_secs(config.cache.search_ttl_secs))
    .with_call_timeout(call_timeout);

    if config.gateway.rerank_enabled {
        search = search.with_completions(completions);
    }

    let search = Arc::new(search);
    let optimizer = Arc::new(CacheOptimizer::new(cache, search.clone(), metrics));

    let admin_token = config
        .auth
        .admin_token
        .clone()
        .or_else(|| std::env::var("ADMIN_BEARER_TOKEN").ok());

    if admin_token.is_none() {
        warn!("No admin bearer token configured; sync triggers will be rejected");
    }

    let state = AppState::new(
        orchestrator.clone(),
        search,
        optimizer.clone(),
        store,
        index,
        embeddings,
        admin_token,
    );

    Ok(AppServices {
        state,
        orchestrator,
        optimizer,
    })
}

// ============================================================================
// Default Entities
// ============================================================================

/// The configured source tables. Loaded once at startup; each binds a
/// content-service collection to a relational table and a visibility class.
fn default_source_tables() -> Vec<SourceTableConfig> {
    vec![
        SourceTableConfig::new("catalog", "catalog", "catalog", Visibility::Public),
        SourceTableConfig::new("guides", "guides", "guides", Visibility::Public),
        SourceTableConfig::new(
            "playbooks",
            "playbooks",
            "playbooks",
            Visibility::Internal,
        ),
    ]
}

/// Static persona table binding request origins to knowledge-base scopes.
fn default_personas() -> Vec<PersonaContext> {
    vec![
        PersonaContext::new("public", vec![Visibility::Public]),
        PersonaContext::new("internal", vec![Visibility::Public, Visibility::Internal]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{SearchParams, SourceRecord, SyncStatus};
    use infrastructure::content_source::mock::MockContentSource;
    use infrastructure::gateway::mock::MockEmbeddingGateway;

    /// End-to-end: seed the source, run a full sync, search with a public
    /// persona, and only the public record comes back.
    #[tokio::test]
    async fn test_sync_then_search_respects_visibility() {
        let source = Arc::new(MockContentSource::new());
        let store = Arc::new(InMemoryRelationalStore::new());
        let index = Arc::new(InMemoryVectorIndex::new());
        let embeddings = Arc::new(MockEmbeddingGateway::new());

        source.seed(
            "col-catalog",
            vec![
                SourceRecord::new("pub-1", "Catalog entry", "catalog body", Utc::now())
                    .with_visibility(Visibility::Public),
                SourceRecord::new("int-1", "Catalog entry", "catalog body", Utc::now())
                    .with_visibility(Visibility::Internal),
            ],
        );

        let tables = vec![SourceTableConfig::new(
            "catalog",
            "catalog",
            "col-catalog",
            Visibility::Public,
        )];

        let adapter = TableSyncAdapter::new(
            source,
            store.clone(),
            index.clone(),
            embeddings.clone(),
        );

        let orchestrator = SyncOrchestrator::new(
            adapter,
            store.clone(),
            index.clone(),
            embeddings.clone(),
            tables,
            Arc::new(NoopMetricsRecorder),
        );

        let summary = orchestrator.run_full(false).await.unwrap();
        assert_eq!(summary.status, SyncStatus::Success);
        assert_eq!(summary.total_loaded, 2);

        let cache = Arc::new(SearchCache::new(100));
        let personas = Arc::new(PersonaRegistry::new(default_personas()));
        let search = SemanticSearchService::new(
            embeddings,
            index,
            cache,
            personas,
            Arc::new(NoopMetricsRecorder),
        );

        let hit = search
            .search(&SearchParams::new("catalog", "public", 5, 0.0))
            .await
            .unwrap();

        assert_eq!(hit.outcome.results.len(), 1);
        assert_eq!(hit.outcome.results[0].id, "catalog:pub-1");

        let hit = search
            .search(&SearchParams::new("catalog", "internal", 5, 0.0))
            .await
            .unwrap();

        assert_eq!(hit.outcome.results.len(), 2);
    }

    #[test]
    fn test_default_tables_and_personas_agree() {
        let tables = default_source_tables();
        let personas = PersonaRegistry::new(default_personas());

        assert!(tables.iter().any(|t| t.visibility == Visibility::Internal));

        let public = personas.resolve("public").unwrap();
        let internal_tables: Vec<_> = tables
            .iter()
            .filter(|t| !public.can_see(t.visibility))
            .collect();

        // The public persona must not reach the internal tables
        assert!(!internal_tables.is_empty());
    }
}
