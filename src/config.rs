//! Configuration for the orchestrator and AI client

use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleConfig;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Tenant namespace used for vector index records
    #[serde(default = "default_tenant")]
    pub tenant: String,
    /// Vault-relative folder that archived entities are moved into
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
    /// Maximum characters of title + content sent for embedding
    #[serde(default = "default_embed_content_limit")]
    pub embed_content_limit: usize,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

fn default_tenant() -> String {
    "default".to_string()
}

fn default_archive_dir() -> String {
    "08_Archive".to_string()
}

fn default_embed_content_limit() -> usize {
    8000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tenant: default_tenant(),
            archive_dir: default_archive_dir(),
            embed_content_limit: default_embed_content_limit(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

/// AI client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Backend to use: "tfidf" or "openai"
    pub model: String,
    /// API key (for openai)
    pub api_key: Option<String>,
    /// OpenAI-compatible API base URL (for OpenRouter, Azure, etc.)
    /// Default: https://api.openai.com/v1
    pub base_url: Option<String>,
    /// Embedding model name override (e.g., "text-embedding-3-small")
    pub embedding_model: Option<String>,
    /// Chat model used for extraction prompts
    pub chat_model: Option<String>,
    /// Embedding dimensions (must match model output)
    /// Default: 384 for TF-IDF, 1536 for text-embedding-3-small
    pub dimensions: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "tfidf".to_string(),
            api_key: None,
            base_url: None,
            embedding_model: None,
            chat_model: None,
            dimensions: 384,
        }
    }
}
