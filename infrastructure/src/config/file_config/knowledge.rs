//! Knowledge store configuration from TOML (`[knowledge]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the global store location
pub const GLOBAL_DB_ENV: &str = "GLOBAL_RAG_DB_PATH";

/// Embedding backend used for chunk vectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEmbeddingKind {
    /// Local feature hashing; no model server required
    #[default]
    Hashing,
    /// Embeddings from the local Ollama daemon
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileKnowledgeConfig {
    /// Global store directory (default: `<data dir>/avakin/rag_db`)
    pub global_db_path: Option<String>,
    pub embedding: FileEmbeddingKind,
    /// Model name for the Ollama embedder
    pub embedding_model: String,
    /// Vector size for the hashing embedder
    pub dimensions: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for FileKnowledgeConfig {
    fn default() -> Self {
        Self {
            global_db_path: None,
            embedding: FileEmbeddingKind::Hashing,
            embedding_model: "nomic-embed-text".to_string(),
            dimensions: 384,
            chunk_size: 1000,
            chunk_overlap: 150,
        }
    }
}

impl FileKnowledgeConfig {
    pub fn global_db_dir(&self) -> PathBuf {
        match &self.global_db_path {
            Some(path) => PathBuf::from(path),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("avakin")
                .join("rag_db"),
        }
    }

    /// Project store directory, inside the project's state directory
    pub fn project_db_dir(&self, project_root: &std::path::Path) -> PathBuf {
        project_root.join(".avakin").join("rag_db")
    }
}
