//! Content-management service client
//!
//! Extraction is side-effect-free: one page per call, with an opaque cursor
//! until the source reports no further pages.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::domain::{DomainError, SourceRecord, Visibility};
use crate::infrastructure::http_client::HttpClientTrait;

/// One page of extracted records.
#[derive(Debug, Clone)]
pub struct SourcePage {
    pub records: Vec<SourceRecord>,
    pub next_cursor: Option<String>,
}

/// Per-source-table extractor boundary.
#[async_trait]
pub trait ContentSource: Send + Sync + std::fmt::Debug {
    /// Fetches one page of records from a collection, optionally bounded to
    /// records modified after `since`.
    async fn fetch_page(
        &self,
        collection_id: &str,
        since: Option<DateTime<Utc>>,
        cursor: Option<&str>,
    ) -> Result<SourcePage, DomainError>;
}

/// REST client for the content-management service.
#[derive(Debug)]
pub struct HttpContentSource<C: HttpClientTrait> {
    client: C,
    base_url: String,
    auth_header: String,
    page_size: usize,
}

impl<C: HttpClientTrait> HttpContentSource<C> {
    pub fn new(client: C, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_header: format!("Bearer {}", token.into()),
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn records_url(
        &self,
        collection_id: &str,
        since: Option<DateTime<Utc>>,
        cursor: Option<&str>,
    ) -> String {
        let mut url = format!(
            "{}/v1/collections/{}/records?pageSize={}",
            self.base_url, collection_id, self.page_size
        );

        if let Some(since) = since {
            // Z-suffixed form keeps the query string free of '+'
            url.push_str(&format!(
                "&since={}",
                since.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }

        if let Some(cursor) = cursor {
            url.push_str(&format!("&cursor={}", cursor));
        }

        url
    }
}

#[async_trait]
impl<C: HttpClientTrait> ContentSource for HttpContentSource<C> {
    async fn fetch_page(
        &self,
        collection_id: &str,
        since: Option<DateTime<Utc>>,
        cursor: Option<&str>,
    ) -> Result<SourcePage, DomainError> {
        let url = self.records_url(collection_id, since, cursor);
        let headers = vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ];

        let json = self.client.get_json(&url, headers).await?;

        let page: WirePage = serde_json::from_value(json).map_err(|e| {
            DomainError::external_api(
                "content-source",
                format!("Failed to parse records page: {}", e),
            )
        })?;

        let records = page
            .records
            .into_iter()
            .map(WireRecord::into_record)
            .collect();

        Ok(SourcePage {
            records,
            next_cursor: page.next_cursor,
        })
    }
}

// Wire types for the content-service records endpoint

#[derive(Debug, Deserialize)]
struct WirePage {
    records: Vec<WireRecord>,
    #[serde(rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    visibility: Option<String>,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

impl WireRecord {
    fn into_record(self) -> SourceRecord {
        let mut record =
            SourceRecord::new(self.id, self.title, self.content, self.updated_at);

        if let Some(topic) = self.topic {
            record = record.with_topic(topic);
        }

        if let Some(visibility) = self.visibility.as_deref().and_then(Visibility::parse) {
            record = record.with_visibility(visibility);
        }

        record
    }
}
