//! Semantic search parameters, results, and facets

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Longest accepted query text, in characters.
pub const MAX_QUERY_LEN: usize = 500;

/// Parameters of one search request. The exact tuple also forms the cache
/// key, so equivalent requests must compare equal field-by-field.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub query: String,
    pub persona: String,
    pub limit: usize,
    pub score_threshold: f32,
}

impl SearchParams {
    pub fn new(
        query: impl Into<String>,
        persona: impl Into<String>,
        limit: usize,
        score_threshold: f32,
    ) -> Self {
        Self {
            query: query.into(),
            persona: persona.into(),
            limit,
            score_threshold,
        }
    }

    /// Rejects empty and overlong queries before any cache or index work.
    pub fn validate(&self) -> Result<(), DomainError> {
        let trimmed = self.query.trim();

        if trimmed.is_empty() {
            return Err(DomainError::validation("Query must not be empty"));
        }

        if self.query.chars().count() > MAX_QUERY_LEN {
            return Err(DomainError::validation(format!(
                "Query exceeds {} characters",
                MAX_QUERY_LEN
            )));
        }

        if self.limit == 0 {
            return Err(DomainError::validation("Limit must be at least 1"));
        }

        Ok(())
    }
}

/// One ranked result returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub excerpt: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub score: f32,
    /// Personalized annotation from the completion gateway, when reranking
    /// succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
}

/// Result counts bucketed by similarity score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBands {
    /// score >= 0.8
    pub high: u64,
    /// 0.6 <= score < 0.8
    pub medium: u64,
    /// score < 0.6
    pub low: u64,
}

/// Aggregated result counts grouped by metadata dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFacets {
    pub by_table: BTreeMap<String, u64>,
    pub by_topic: BTreeMap<String, u64>,
    pub score_bands: ScoreBands,
}

impl SearchFacets {
    pub fn from_results(results: &[SearchResultItem]) -> Self {
        let mut facets = Self::default();

        for item in results {
            *facets.by_table.entry(item.table.clone()).or_insert(0) += 1;

            if let Some(topic) = &item.topic {
                *facets.by_topic.entry(topic.clone()).or_insert(0) += 1;
            }

            if item.score >= 0.8 {
                facets.score_bands.high += 1;
            } else if item.score >= 0.6 {
                facets.score_bands.medium += 1;
            } else {
                facets.score_bands.low += 1;
            }
        }

        facets
    }
}

/// The cacheable product of one uncached retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub results: Vec<SearchResultItem>,
    pub facets: SearchFacets,
}

impl SearchOutcome {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            facets: SearchFacets::default(),
        }
    }
}
