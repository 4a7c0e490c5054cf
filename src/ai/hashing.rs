//! Feature-hashing embedder
//!
//! Runs in-process with no model download or network access, so it counts as
//! a local AI client. Used in tests and offline vaults.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use super::AiClient;
use crate::error::{MemvaultError, Result};

/// Term-frequency embedder using the hashing trick
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() > 1)
            .map(String::from)
            .collect()
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        feature.hash(&mut hasher);
        let hash = hasher.finish();
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        ((hash as usize) % self.dimensions, sign)
    }

    /// Synchronous embedding; never fails
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vector = vec![0.0_f32; self.dimensions];
        if tokens.is_empty() {
            return vector;
        }

        let mut counts: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let total = tokens.len() as f32;
        for (token, count) in counts {
            // longer tokens are rarer, weight them up
            let weight = (1.0 + count / total).ln() * (1.0 + token.len() as f32 * 0.1);
            let (idx, sign) = self.bucket(token);
            vector[idx] += weight * sign;
        }

        for pair in tokens.windows(2) {
            let (idx, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[idx] += 0.5 * sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl AiClient for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(MemvaultError::Extraction(
            "the hashing embedder cannot generate text".to_string(),
        ))
    }

    fn is_local(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "tfidf"
    }
}
