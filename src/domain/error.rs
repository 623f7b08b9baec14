use thiserror::Error;

/// Core domain errors, one variant per failure class in the pipeline.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("External API error: {service} - {message}")]
    ExternalApi { service: String, message: String },

    #[error("Timed out: {operation}")]
    Timeout { operation: String },

    #[error("Rate limited: {message}")]
    RateLimit { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn external_api(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalApi {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable identifier surfaced to API clients as `errorType`.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Database { .. } => "database",
            Self::ExternalApi { .. } => "external_api",
            Self::Timeout { .. } => "timeout",
            Self::RateLimit { .. } => "rate_limit",
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Cache { .. } => "cache",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether a retry policy may re-attempt the failed operation.
    /// Validation and configuration failures never clear on their own;
    /// rate limits are left to the caller's retry-after handling.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database { .. } | Self::ExternalApi { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DomainError::validation("query must not be empty");
        assert_eq!(
            error.to_string(),
            "Validation error: query must not be empty"
        );

        let error = DomainError::external_api("content-source", "HTTP 500");
        assert_eq!(
            error.to_string(),
            "External API error: content-source - HTTP 500"
        );
    }

    #[test]
    fn test_error_type_strings() {
        assert_eq!(DomainError::configuration("x").error_type(), "configuration");
        assert_eq!(DomainError::database("x").error_type(), "database");
        assert_eq!(DomainError::external_api("s", "x").error_type(), "external_api");
        assert_eq!(DomainError::timeout("x").error_type(), "timeout");
        assert_eq!(DomainError::rate_limit("x").error_type(), "rate_limit");
        assert_eq!(DomainError::validation("x").error_type(), "validation");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DomainError::database("down").is_retryable());
        assert!(DomainError::external_api("vector", "503").is_retryable());
        assert!(DomainError::timeout("extract").is_retryable());
        assert!(!DomainError::validation("bad input").is_retryable());
        assert!(!DomainError::configuration("missing token").is_retryable());
        assert!(!DomainError::rate_limit("slow down").is_retryable());
    }
}
