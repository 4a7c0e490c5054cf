//! AI client boundary
//!
//! Backends:
//! - `tfidf`: in-process feature hashing, embeddings only, always available
//! - `openai`: OpenAI-compatible HTTP API for embeddings and extraction
//!   prompts, requires the `openai` feature

mod hashing;
#[cfg(feature = "openai")]
mod openai;

pub use hashing::HashingEmbedder;
#[cfg(feature = "openai")]
pub use openai::OpenAiClient;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AiConfig;
use crate::error::{MemvaultError, Result};

/// Embedding and text generation
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Complete a prompt, returning the model's text
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// True when content never leaves this machine. Cloud clients are only
    /// used for entities whose access code allows cloud AI.
    fn is_local(&self) -> bool {
        false
    }

    fn model_name(&self) -> &str;
}

/// Create an AI client from configuration
pub fn create_ai_client(config: &AiConfig) -> Result<Arc<dyn AiClient>> {
    match config.model.as_str() {
        #[cfg(feature = "openai")]
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                MemvaultError::Config(
                    "OPENAI_API_KEY required when MEMVAULT_AI_MODEL=openai".to_string(),
                )
            })?;
            Ok(Arc::new(OpenAiClient::with_config(
                api_key,
                config.base_url.clone(),
                config.embedding_model.clone(),
                config.chat_model.clone(),
                Some(config.dimensions),
            )))
        }
        #[cfg(not(feature = "openai"))]
        "openai" => Err(MemvaultError::Config(
            "The openai backend requires the 'openai' feature".to_string(),
        )),
        "tfidf" => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        other => Err(MemvaultError::Config(format!(
            "Unknown AI model: '{}'. Use 'openai' or 'tfidf'",
            other
        ))),
    }
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = [1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert!((cosine_similarity(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn test_create_ai_client() {
        let client = create_ai_client(&AiConfig::default()).unwrap();
        assert_eq!(client.model_name(), "tfidf");
        assert!(client.is_local());

        let unknown = AiConfig {
            model: "word2vec".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_ai_client(&unknown),
            Err(MemvaultError::Config(_))
        ));
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_openai_requires_key() {
        let config = AiConfig {
            model: "openai".to_string(),
            ..Default::default()
        };
        assert!(create_ai_client(&config).is_err());
    }
}
