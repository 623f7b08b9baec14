//! Source table descriptors and extracted records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visibility class restricting which persona may retrieve a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static per-source descriptor. Loaded once at process start, immutable for
/// the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTableConfig {
    /// Logical source name, e.g. "catalog"
    pub name: String,
    /// Relational table records are loaded into
    pub target_table: String,
    /// Collection id on the content-management service
    pub source_collection_id: String,
    /// Default visibility class for records in this table
    pub visibility: Visibility,
}

impl SourceTableConfig {
    pub fn new(
        name: impl Into<String>,
        target_table: impl Into<String>,
        source_collection_id: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        Self {
            name: name.into(),
            target_table: target_table.into(),
            source_collection_id: source_collection_id.into(),
            visibility,
        }
    }
}

/// One record extracted from the content-management service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    /// Stable id on the source side; the upsert key
    pub source_id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Per-record visibility override; absent means the table's class applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// Source-side modification timestamp, compared against the watermark
    pub updated_at: DateTime<Utc>,
}

impl SourceRecord {
    pub fn new(
        source_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            title: title.into(),
            content: content.into(),
            topic: None,
            visibility: None,
            updated_at,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Visibility actually applied when loading/indexing this record.
    pub fn effective_visibility(&self, table: &SourceTableConfig) -> Visibility {
        self.visibility.unwrap_or(table.visibility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_roundtrip() {
        assert_eq!(Visibility::parse("public"), Some(Visibility::Public));
        assert_eq!(Visibility::parse("internal"), Some(Visibility::Internal));
        assert_eq!(Visibility::parse("secret"), None);
        assert_eq!(Visibility::Public.as_str(), "public");
    }

    #[test]
    fn test_effective_visibility_defaults_to_table() {
        let table = SourceTableConfig::new("catalog", "catalog", "col-1", Visibility::Public);
        let record = SourceRecord::new("r1", "Title", "Body", Utc::now());

        assert_eq!(record.effective_visibility(&table), Visibility::Public);

        let record = record.with_visibility(Visibility::Internal);
        assert_eq!(record.effective_visibility(&table), Visibility::Internal);
    }

    #[test]
    fn test_visibility_serialization() {
        assert_eq!(
            serde_json::to_string(&Visibility::Internal).unwrap(),
            "\"internal\""
        );
    }
}
