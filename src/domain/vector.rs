//! Vector index record and query types

use serde::{Deserialize, Serialize};

use crate::domain::source::Visibility;

/// Metadata attached to every indexed vector; drives visibility filtering
/// and facet computation on the search path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    pub visibility: Visibility,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub excerpt: String,
}

/// One embedded record owned by the vector index. Re-sync overwrites by id;
/// vectors are never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    /// Stable id, `{table}:{source_id}`
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: VectorMetadata,
}

impl VectorRecord {
    pub fn vector_id(table: &str, source_id: &str) -> String {
        format!("{}:{}", table, source_id)
    }
}

/// Similarity query restricted to a visibility scope and optionally to one
/// source table.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub embedding: Vec<f32>,
    pub limit: usize,
    pub visibility: Vec<Visibility>,
    pub table: Option<String>,
}

impl VectorQuery {
    pub fn new(embedding: Vec<f32>, limit: usize, visibility: Vec<Visibility>) -> Self {
        Self {
            embedding,
            limit,
            visibility,
            table: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

/// One scored match returned by a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_id_is_stable() {
        assert_eq!(VectorRecord::vector_id("catalog", "n-42"), "catalog:n-42");
    }

    #[test]
    fn test_query_builder() {
        let query = VectorQuery::new(vec![0.1, 0.2], 10, vec![Visibility::Public])
            .with_table("catalog");

        assert_eq!(query.limit, 10);
        assert_eq!(query.table.as_deref(), Some("catalog"));
    }
}
