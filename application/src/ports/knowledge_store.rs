//! Knowledge store and embedder ports

use async_trait::async_trait;
use avakin_domain::{Document, EmbeddingModelId, ProjectId, QueryScope, RetrievedChunk, Scope};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeError {
    #[error("Cannot ingest {document}: {reason}")]
    Ingest { document: String, reason: String },

    #[error(
        "Embedding model mismatch in {store}: store holds {stored}, configured model is {configured}. Rebuild the store to switch models."
    )]
    EmbeddingModelMismatch {
        store: String,
        stored: EmbeddingModelId,
        configured: EmbeddingModelId,
    },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Knowledge store I/O error: {0}")]
    Storage(String),

    #[error("No knowledge store is open for {0}")]
    UnknownScope(String),
}

impl KnowledgeError {
    pub fn ingest(document: impl Into<String>, reason: impl Into<String>) -> Self {
        KnowledgeError::Ingest {
            document: document.into(),
            reason: reason.into(),
        }
    }
}

/// Computes embeddings. One instance corresponds to one embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> EmbeddingModelId;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError>;
}

/// Outcome of a batch ingestion. Failures of single documents do not stop
/// the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks_added: usize,
    pub duplicates_skipped: usize,
    /// (document id, reason)
    pub failures: Vec<(String, String)>,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.documents += other.documents;
        self.chunks_added += other.chunks_added;
        self.duplicates_skipped += other.duplicates_skipped;
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Dual-scope knowledge store
#[async_trait]
pub trait KnowledgeStorePort: Send + Sync {
    /// Open (or create) the isolated store of a project
    async fn open_project(&self, project: &ProjectId, dir: &Path) -> Result<(), KnowledgeError>;

    /// Chunk, embed and store one document. Returns the report for it.
    async fn ingest(
        &self,
        document: Document,
        scope: &Scope,
    ) -> Result<IngestReport, KnowledgeError>;

    /// Ingest a file or a directory tree
    async fn ingest_path(&self, path: &Path, scope: &Scope)
    -> Result<IngestReport, KnowledgeError>;

    /// k nearest chunks across the scopes admitted by `scope`
    async fn query(
        &self,
        text: &str,
        scope: &QueryScope,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, KnowledgeError>;

    /// Re-embed every chunk of a store with `embedder`, excluding queries on
    /// that store for the duration. Returns the number of chunks re-embedded.
    async fn rebuild(
        &self,
        scope: &Scope,
        embedder: Arc<dyn Embedder>,
    ) -> Result<usize, KnowledgeError>;
}

/// Store used when retrieval is disabled
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeStorePort for NoKnowledge {
    async fn open_project(&self, _project: &ProjectId, _dir: &Path) -> Result<(), KnowledgeError> {
        Ok(())
    }

    async fn ingest(
        &self,
        _document: Document,
        _scope: &Scope,
    ) -> Result<IngestReport, KnowledgeError> {
        Ok(IngestReport::default())
    }

    async fn ingest_path(
        &self,
        _path: &Path,
        _scope: &Scope,
    ) -> Result<IngestReport, KnowledgeError> {
        Ok(IngestReport::default())
    }

    async fn query(
        &self,
        _text: &str,
        _scope: &QueryScope,
        _k: usize,
    ) -> Result<Vec<RetrievedChunk>, KnowledgeError> {
        Ok(Vec::new())
    }

    async fn rebuild(
        &self,
        _scope: &Scope,
        _embedder: Arc<dyn Embedder>,
    ) -> Result<usize, KnowledgeError> {
        Ok(0)
    }
}
