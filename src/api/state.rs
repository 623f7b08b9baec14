//! Application state for shared services
//!
//! Services are constructed once at process start and injected into
//! handlers behind trait objects; nothing here is a process-wide singleton.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{CacheStats, DomainError, EmbeddingGateway, SearchParams, SyncSummary};
use crate::infrastructure::relational::RelationalStore;
use crate::infrastructure::vector_index::VectorIndex;
use crate::infrastructure::{
    CacheOptimizer, SearchHit, SemanticSearchService, SyncCapabilities, SyncOrchestrator,
    WarmReport,
};

/// Shared services behind dynamic dispatch.
#[derive(Clone)]
pub struct AppState {
    pub sync_service: Arc<dyn SyncServiceTrait>,
    pub search_service: Arc<dyn SearchServiceTrait>,
    pub cache_service: Arc<dyn CacheServiceTrait>,
    pub store: Arc<dyn RelationalStore>,
    pub index: Arc<dyn VectorIndex>,
    pub embeddings: Arc<dyn EmbeddingGateway>,
    pub admin_token: Option<String>,
}

/// Sync orchestration operations exposed over HTTP.
#[async_trait]
pub trait SyncServiceTrait: Send + Sync {
    async fn run_full(&self, force: bool) -> Result<SyncSummary, DomainError>;
    async fn run_incremental(&self) -> Result<SyncSummary, DomainError>;
    async fn run_table(&self, name: &str) -> Result<SyncSummary, DomainError>;
    fn capabilities(&self) -> SyncCapabilities;
}

/// Search operations exposed over HTTP.
#[async_trait]
pub trait SearchServiceTrait: Send + Sync {
    async fn search(&self, params: SearchParams) -> Result<SearchHit, DomainError>;
}

/// Cache management operations exposed over HTTP.
#[async_trait]
pub trait CacheServiceTrait: Send + Sync {
    fn stats(&self) -> CacheStats;
    fn clear(&self);
    async fn warm(&self, targets: Vec<SearchParams>) -> Result<WarmReport, DomainError>;
}

#[async_trait]
impl SyncServiceTrait for SyncOrchestrator {
    async fn run_full(&self, force: bool) -> Result<SyncSummary, DomainError> {
        SyncOrchestrator::run_full(self, force).await
    }

    async fn run_incremental(&self) -> Result<SyncSummary, DomainError> {
        SyncOrchestrator::run_incremental(self).await
    }

    async fn run_table(&self, name: &str) -> Result<SyncSummary, DomainError> {
        SyncOrchestrator::run_one(self, name).await
    }

    fn capabilities(&self) -> SyncCapabilities {
        SyncOrchestrator::capabilities(self)
    }
}

#[async_trait]
impl SearchServiceTrait for SemanticSearchService {
    async fn search(&self, params: SearchParams) -> Result<SearchHit, DomainError> {
        SemanticSearchService::search(self, &params).await
    }
}

#[async_trait]
impl CacheServiceTrait for CacheOptimizer {
    fn stats(&self) -> CacheStats {
        CacheOptimizer::cache_stats(self)
    }

    fn clear(&self) {
        CacheOptimizer::clear_cache(self)
    }

    async fn warm(&self, targets: Vec<SearchParams>) -> Result<WarmReport, DomainError> {
        CacheOptimizer::warm(self, targets).await
    }
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sync_service: Arc<dyn SyncServiceTrait>,
        search_service: Arc<dyn SearchServiceTrait>,
        cache_service: Arc<dyn CacheServiceTrait>,
        store: Arc<dyn RelationalStore>,
        index: Arc<dyn VectorIndex>,
        embeddings: Arc<dyn EmbeddingGateway>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            sync_service,
            search_service,
            cache_service,
            store,
            index,
            embeddings,
            admin_token,
        }
    }
}
