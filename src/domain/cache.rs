//! Cache key construction and observable cache statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::search::SearchParams;

/// Deterministic cache key builder: a namespace plus sorted `k=v` components.
/// Component order at the call site never affects the produced key.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    namespace: String,
    components: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            components: BTreeMap::new(),
        }
    }

    pub fn with_component(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.components.insert(key.into(), value.into());
        self
    }

    pub fn build(&self) -> String {
        let mut parts = vec![self.namespace.clone()];

        for (k, v) in &self.components {
            parts.push(format!("{}={}", k, v));
        }

        parts.join(":")
    }
}

/// Canonical key for a search request: a pure function over the exact
/// parameter tuple, with the threshold printed at fixed precision so
/// numerically equal requests always hit the same entry.
pub fn search_cache_key(params: &SearchParams) -> String {
    CacheKeyBuilder::new("search")
        .with_component("q", &params.query)
        .with_component("persona", &params.persona)
        .with_component("limit", params.limit.to_string())
        .with_component("threshold", format!("{:.4}", params.score_threshold))
        .build()
}

/// Cache observability snapshot.
///
/// `hit_rate` is an explicit hit/miss ratio (`hits / (hits + misses)`, 0 when
/// the store was never read) - not the legacy `size / totalAccesses` gauge,
/// which was misleading and is intentionally not reproduced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}
