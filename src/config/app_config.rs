use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub source: SourceConfig,
    pub vector: VectorConfig,
    pub gateway: GatewayConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Admin bearer token; `ADMIN_BEARER_TOKEN` env overrides the file value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Bounded entry count of the search cache
    pub max_size: usize,
    /// TTL applied to search results
    pub search_ttl_secs: u64,
    /// Cadence of the optimizer's sweep loop
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Wall-clock budget for one orchestrator run
    pub run_budget_secs: u64,
    /// Per-external-call deadline
    pub call_timeout_secs: u64,
    /// Records per embedding gateway call
    pub embed_batch_size: usize,
    /// Spawns an interval-driven incremental sync when set
    pub incremental_interval_secs: Option<u64>,
    /// Spawns an interval-driven full sync when set
    pub full_interval_secs: Option<u64>,
}

/// Content-management service endpoint. The token comes from the
/// `SOURCE_API_TOKEN` env var.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub dimensions: u32,
    pub table_name: String,
}

/// Embedding/completion provider. The key comes from the `GATEWAY_API_KEY`
/// (or `OPENAI_API_KEY`) env var.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub completion_model: String,
    /// Annotate search results through the completion gateway
    pub rerank_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            search_ttl_secs: 600,
            sweep_interval_secs: 300,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            run_budget_secs: 1800,
            call_timeout_secs: 30,
            embed_batch_size: 32,
            incremental_interval_secs: None,
            full_interval_secs: None,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            page_size: 100,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimensions: 1536,
            table_name: "content_vectors".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            completion_model: "gpt-4o-mini".to_string(),
            rerank_enabled: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.cache.search_ttl_secs, 600);
        assert_eq!(config.cache.sweep_interval_secs, 300);
        assert_eq!(config.sync.embed_batch_size, 32);
        assert!(config.auth.admin_token.is_none());
        assert!(config.sync.incremental_interval_secs.is_none());
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"cache": {"max_size": 50}}"#).unwrap();

        assert_eq!(config.cache.max_size, 50);
        assert_eq!(config.cache.search_ttl_secs, 600);
        assert_eq!(config.server.port, 8080);
    }
}
