//! Layered application configuration

mod app_config;

pub use app_config::{
    AppConfig, AuthConfig, CacheConfig, GatewayConfig, LogFormat, LoggingConfig, MetricsConfig,
    ServerConfig, SourceConfig, SyncConfig, VectorConfig,
};
