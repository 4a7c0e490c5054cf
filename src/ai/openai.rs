//! OpenAI-compatible client
//!
//! Works against OpenAI, OpenRouter, Azure OpenAI and local servers that
//! speak the same API (Ollama, LM Studio).

use async_trait::async_trait;
use serde_json::{json, Value};

use super::AiClient;
use crate::error::{MemvaultError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Embeddings and chat completions over HTTP
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    dimensions: Option<usize>,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, None, None, None, None)
    }

    pub fn with_config(
        api_key: String,
        base_url: Option<String>,
        embedding_model: Option<String>,
        chat_model: Option<String>,
        dimensions: Option<usize>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            embedding_model: embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: chat_model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            dimensions,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "memvault")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(MemvaultError::Embedding(format!(
                "{} returned {}: {}",
                endpoint, status, text
            )));
        }

        Ok(response.json().await?)
    }
}

/// Pull the embedding vector out of an `/embeddings` response
pub(crate) fn parse_embedding(data: &Value, expected: Option<usize>) -> Result<Vec<f32>> {
    let embedding: Vec<f32> = data["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| MemvaultError::Embedding("Invalid embeddings response".to_string()))?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if let Some(expected) = expected {
        if embedding.len() != expected {
            return Err(MemvaultError::Embedding(format!(
                "Embedding dimensions mismatch: expected {}, got {}",
                expected,
                embedding.len()
            )));
        }
    }
    Ok(embedding)
}

/// Pull the first message out of a `/chat/completions` response
pub(crate) fn parse_completion(data: &Value) -> Result<String> {
    data["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| MemvaultError::Extraction("Invalid completion response".to_string()))
}

#[async_trait]
impl AiClient for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let data = self
            .post(
                "embeddings",
                json!({ "input": text, "model": self.embedding_model }),
            )
            .await?;
        parse_embedding(&data, self.dimensions)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let data = self
            .post(
                "chat/completions",
                json!({
                    "model": self.chat_model,
                    "temperature": 0.0,
                    "messages": [{ "role": "user", "content": prompt }],
                }),
            )
            .await?;
        parse_completion(&data)
    }

    /// Servers on the loopback interface keep content on this machine
    fn is_local(&self) -> bool {
        let host = self
            .base_url
            .split("://")
            .nth(1)
            .unwrap_or(&self.base_url)
            .split(['/', ':'])
            .next()
            .unwrap_or_default();
        matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0")
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}
