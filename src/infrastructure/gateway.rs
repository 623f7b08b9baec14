//! OpenAI-compatible embedding/completion gateway

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{ChatMessage, CompletionGateway, DomainError, EmbeddingGateway};
use crate::infrastructure::http_client::HttpClientTrait;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Gateway speaking the OpenAI embeddings/chat-completions wire format.
#[derive(Debug)]
pub struct OpenAiGateway<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    embedding_model: String,
    completion_model: String,
}

impl<C: HttpClientTrait> OpenAiGateway<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth_header: format!("Bearer {}", api_key.into()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            completion_model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_completion_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = model.into();
        self
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingGateway for OpenAiGateway<C> {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": texts,
        });

        let json = self.client.post_json(&url, self.headers(), &body).await?;

        let response: WireEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::external_api(
                "embedding-gateway",
                format!("Failed to parse embedding response: {}", e),
            )
        })?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        let url = format!("{}/v1/models", self.base_url);
        Ok(self.client.get_json(&url, self.headers()).await.is_ok())
    }
}

#[async_trait]
impl<C: HttpClientTrait> CompletionGateway for OpenAiGateway<C> {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, DomainError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.completion_model,
            "messages": messages,
        });

        let json = self.client.post_json(&url, self.headers(), &body).await?;

        let response: WireCompletionResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::external_api(
                "completion-gateway",
                format!("Failed to parse completion response: {}", e),
            )
        })?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                DomainError::external_api("completion-gateway", "Response contained no choices")
            })
    }
}

// OpenAI wire types

#[derive(Debug, Deserialize)]
struct WireEmbeddingResponse {
    data: Vec<WireEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct WireEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct WireCompletionResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    content: String,
}
