//! Entity and relationship extraction from note text
//!
//! The extractor asks the AI client for a JSON object of the form
//! `{"entities": [{name, type}], "relations": [{source, target, type, description}]}`
//! and tolerates answers wrapped in markdown code fences or surrounded by
//! prose.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ai::AiClient;
use crate::error::{MemvaultError, Result};

/// Upper bound on note text included in a prompt
pub const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type", default = "default_entity_type")]
    pub entity_type: String,
}

fn default_entity_type() -> String {
    "concept".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default = "default_relation_type")]
    pub relation_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_relation_type() -> String {
    "related_to".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relations: Vec<ExtractedRelation>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

/// Prompt asking for people, projects, organizations, places and concepts
pub fn build_prompt(title: &str, content: &str) -> String {
    let text: String = content.chars().take(MAX_PROMPT_CHARS).collect();
    format!(
        r#"Extract the entities and relationships mentioned in the note below.
Entity types: person, organization, project, place, event, task, concept.
Return only a JSON object with this structure:
{{
  "entities": [{{"name": "entity name", "type": "person"}}],
  "relations": [{{"source": "entity name", "target": "entity name", "type": "works_on", "description": "short explanation"}}]
}}

Title: {title}

{text}"#
    )
}

/// Parse a model answer into an [`ExtractionResult`]
pub fn parse_response(response: &str) -> Result<ExtractionResult> {
    let start = response.find('{');
    let end = response.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => {
            return Err(MemvaultError::Extraction(
                "No JSON object in extraction response".to_string(),
            ))
        }
    };

    let mut result: ExtractionResult = serde_json::from_str(json)
        .map_err(|e| MemvaultError::Extraction(format!("Invalid extraction JSON: {}", e)))?;

    result.entities.retain(|e| !e.name.trim().is_empty());
    result
        .relations
        .retain(|r| !r.source.trim().is_empty() && !r.target.trim().is_empty());
    Ok(result)
}

/// Extraction backed by an [`AiClient`]
#[derive(Clone)]
pub struct EntityExtractor {
    client: Arc<dyn AiClient>,
}

impl EntityExtractor {
    pub fn new(client: Arc<dyn AiClient>) -> Self {
        Self { client }
    }

    /// Whether the backing client keeps content on this machine
    pub fn is_local(&self) -> bool {
        self.client.is_local()
    }

    pub async fn extract(&self, title: &str, content: &str) -> Result<ExtractionResult> {
        let response = self.client.generate(&build_prompt(title, content)).await?;
        let result = parse_response(&response)?;
        tracing::debug!(
            "Extracted {} entities, {} relations from '{}'",
            result.entities.len(),
            result.relations.len(),
            title
        );
        Ok(result)
    }
}
