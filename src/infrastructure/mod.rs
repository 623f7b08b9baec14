//! Infrastructure layer - adapters over external services and the cache

pub mod cache;
pub mod content_source;
pub mod gateway;
pub mod http_client;
pub mod logging;
pub mod metrics;
pub mod relational;
pub mod search;
pub mod sync;
pub mod vector_index;

pub use cache::optimizer::{CacheOptimizer, MaintenanceReport, WarmReport, MAINTENANCE_INTERVAL};
pub use cache::store::CacheStore;
pub use content_source::{ContentSource, HttpContentSource, SourcePage};
pub use gateway::OpenAiGateway;
pub use http_client::{HttpClient, HttpClientTrait};
pub use metrics::{init_metrics, create_metrics_router, PrometheusMetricsRecorder};
pub use relational::{InMemoryRelationalStore, LoadOutcome, PgRelationalStore, RelationalStore};
pub use search::service::{SearchCache, SearchHit, SemanticSearchService};
pub use sync::adapter::TableSyncAdapter;
pub use sync::orchestrator::{SyncCapabilities, SyncOrchestrator};
pub use vector_index::{
    InMemoryVectorIndex, PgvectorIndex, PgvectorIndexConfig, VectorIndex,
};
