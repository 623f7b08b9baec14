//! HTTP client seam for external services

use async_trait::async_trait;

use crate::domain::DomainError;

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn get_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
    ) -> Result<serde_json::Value, DomainError>;

    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError>;
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    service: String,
}

impl HttpClient {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            service: service.into(),
        }
    }

    pub fn with_timeout(service: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            service: service.into(),
        }
    }

    async fn handle_response(
        &self,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, DomainError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DomainError::rate_limit(format!(
                "{} returned HTTP 429",
                self.service
            )));
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(DomainError::external_api(
                &self.service,
                format!("HTTP {}: {}", status, error_body),
            ));
        }

        response.json().await.map_err(|e| {
            DomainError::external_api(&self.service, format!("Failed to parse response: {}", e))
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> DomainError {
        if err.is_timeout() {
            DomainError::timeout(format!("{} request", self.service))
        } else {
            DomainError::external_api(&self.service, format!("Request failed: {}", err))
        }
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn get_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
    ) -> Result<serde_json::Value, DomainError> {
        let mut request = self.client.get(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        self.handle_response(response).await
    }

    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        self.handle_response(response).await
    }
}
