//! Embedders: offline feature hashing and the Ollama embed endpoint

use crate::config::{FileEmbeddingKind, FileKnowledgeConfig, FileOllamaConfig};
use crate::providers::http::{build_client, join_url, send_json};
use crate::providers::{DEFAULT_OLLAMA_BASE, OLLAMA_BASE_ENV};
use async_trait::async_trait;
use avakin_application::{Embedder, KnowledgeError};
use avakin_domain::EmbeddingModelId;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const HASHING_MODEL: &str = "hashing-v1";

/// Deterministic bag-of-words embedder.
///
/// Lowercased alphanumeric tokens are hashed into `dimensions` signed
/// buckets and the vector is L2-normalised. Needs no model server, so it is
/// the default for offline use.
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

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> EmbeddingModelId {
        EmbeddingModelId::new(HASHING_MODEL, self.dimensions)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embeddings from a local Ollama daemon (`POST /api/embed`)
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, KnowledgeError> {
        Ok(Self {
            client: build_client().map_err(|e| KnowledgeError::Embedding(e.to_string()))?,
            base_url: base_url.into(),
            model: model.into(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> EmbeddingModelId {
        EmbeddingModelId::new(format!("ollama/{}", self.model), self.dimensions)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response: EmbedResponse = send_json(
            self.client
                .post(join_url(&self.base_url, "api/embed"))
                .json(&EmbedRequest {
                    model: &self.model,
                    input: texts,
                }),
        )
        .await
        .map_err(|e| KnowledgeError::Embedding(e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(KnowledgeError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}

/// The embedder selected by `[knowledge]`
pub fn embedder_from_config(
    knowledge: &FileKnowledgeConfig,
    ollama: &FileOllamaConfig,
) -> Result<Arc<dyn Embedder>, KnowledgeError> {
    Ok(match knowledge.embedding {
        FileEmbeddingKind::Hashing => Arc::new(HashingEmbedder::new(knowledge.dimensions)),
        FileEmbeddingKind::Ollama => {
            let base = ollama
                .base_url
                .clone()
                .or_else(|| std::env::var(OLLAMA_BASE_ENV).ok())
                .unwrap_or_else(|| DEFAULT_OLLAMA_BASE.to_string());
            Arc::new(OllamaEmbedder::new(
                base,
                &knowledge.embedding_model,
                knowledge.dimensions,
            )?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use avakin_domain::cosine_similarity;

    #[test]
    fn test_hashing_is_deterministic_and_case_insensitive() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_one("Alpha beta");
        let b = embedder.embed_one("alpha BETA");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_related_text_scores_higher() {
        let embedder = HashingEmbedder::new(384);
        let query = embedder.embed_one("parse the config file");
        let related = embedder.embed_one("function to parse a config file from disk");
        let unrelated = embedder.embed_one("render chart colours");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_one("  ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_model_ids_differ_by_backend() {
        let hashing = HashingEmbedder::new(384).model_id();
        let ollama = OllamaEmbedder::new(DEFAULT_OLLAMA_BASE, "nomic-embed-text", 384)
            .unwrap()
            .model_id();
        assert!(!hashing.is_compatible_with(&ollama));
    }
}
