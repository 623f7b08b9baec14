//! Persona resolution for inbound search requests

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::source::Visibility;
use crate::domain::DomainError;

/// Resolved request context: which knowledge-base scope a request may see.
/// Derived from the static persona table, immutable per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaContext {
    pub persona_id: String,
    pub visibility_scope: Vec<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_collection_id: Option<String>,
}

impl PersonaContext {
    pub fn new(persona_id: impl Into<String>, visibility_scope: Vec<Visibility>) -> Self {
        Self {
            persona_id: persona_id.into(),
            visibility_scope,
            source_collection_id: None,
        }
    }

    pub fn with_source_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.source_collection_id = Some(collection_id.into());
        self
    }

    pub fn can_see(&self, visibility: Visibility) -> bool {
        self.visibility_scope.contains(&visibility)
    }
}

/// Static persona table, loaded once at process start.
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: HashMap<String, PersonaContext>,
}

impl PersonaRegistry {
    pub fn new(personas: Vec<PersonaContext>) -> Self {
        Self {
            personas: personas
                .into_iter()
                .map(|p| (p.persona_id.clone(), p))
                .collect(),
        }
    }

    pub fn resolve(&self, persona_id: &str) -> Result<&PersonaContext, DomainError> {
        self.personas
            .get(persona_id)
            .ok_or_else(|| DomainError::validation(format!("Unknown persona '{}'", persona_id)))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.personas.keys().map(String::as_str).collect()
    }
}
