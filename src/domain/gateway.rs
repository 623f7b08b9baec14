//! Embedding and completion gateway contracts
//!
//! The provider behind these traits is an external collaborator; the
//! pipeline only depends on "text in, vector out" and "messages in, reply
//! out".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Role of one chat message sent to the completion gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Turns text into vectors.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync + std::fmt::Debug {
    /// Embeds a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, DomainError>;

    /// Cheap reachability probe used by the sync preflight.
    async fn health_check(&self) -> Result<bool, DomainError>;
}

/// Turns a message list into a generated reply.
#[async_trait]
pub trait CompletionGateway: Send + Sync + std::fmt::Debug {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, DomainError>;
}
