//! [`KnowledgeStorePort`] over per-scope partitions on disk

use super::ingest::{collect_files, document_id, extract_document, is_supported};
use async_trait::async_trait;
use avakin_application::{
    CapabilityRegistryPort, Embedder, IngestReport, KnowledgeError, KnowledgeStorePort,
};
use avakin_domain::{
    Chunker, Document, EmbeddingModelId, KnowledgeChunk, ProjectId, QueryScope, RetrievedChunk,
    Scope, cosine_similarity, rank_chunks,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.jsonl";
const EMBED_BATCH: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    embedding_model: EmbeddingModelId,
}

#[derive(Default)]
struct PartitionState {
    /// Model of the stored vectors; `None` while the partition is empty
    model: Option<EmbeddingModelId>,
    chunks: Vec<KnowledgeChunk>,
    hashes: HashSet<String>,
}

/// One scope's store. Queries hold the read lock, ingestion takes the write
/// lock only to insert, rebuild holds the write lock throughout.
struct Partition {
    scope: Scope,
    dir: PathBuf,
    state: RwLock<PartitionState>,
}

fn storage_err(context: &Path, e: impl std::fmt::Display) -> KnowledgeError {
    KnowledgeError::Storage(format!("{}: {}", context.display(), e))
}

fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

impl Partition {
    async fn open(scope: Scope, dir: PathBuf) -> Result<Self, KnowledgeError> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_err(&dir, e))?;

        let mut state = PartitionState::default();

        let manifest_path = dir.join(MANIFEST_FILE);
        match tokio::fs::read_to_string(&manifest_path).await {
            Ok(text) => {
                let manifest: Manifest =
                    serde_json::from_str(&text).map_err(|e| storage_err(&manifest_path, e))?;
                state.model = Some(manifest.embedding_model);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(storage_err(&manifest_path, e)),
        }

        let chunks_path = dir.join(CHUNKS_FILE);
        match tokio::fs::read_to_string(&chunks_path).await {
            Ok(text) => {
                for (line_no, line) in text.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<KnowledgeChunk>(line) {
                        Ok(chunk) => {
                            state.hashes.insert(chunk.content_hash.clone());
                            state.chunks.push(chunk);
                        }
                        Err(e) => warn!(
                            path = %chunks_path.display(),
                            line = line_no + 1,
                            error = %e,
                            "Skipping unreadable chunk"
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(storage_err(&chunks_path, e)),
        }

        debug!(scope = %scope, chunks = state.chunks.len(), "Opened knowledge partition");
        Ok(Self {
            scope,
            dir,
            state: RwLock::new(state),
        })
    }

    fn max_seq(state: &PartitionState) -> u64 {
        state.chunks.iter().map(|c| c.seq).max().unwrap_or(0)
    }

    fn mismatch(&self, stored: &EmbeddingModelId, configured: &EmbeddingModelId) -> KnowledgeError {
        KnowledgeError::EmbeddingModelMismatch {
            store: self.scope.to_string(),
            stored: stored.clone(),
            configured: configured.clone(),
        }
    }

    fn check_model(
        &self,
        state: &PartitionState,
        configured: &EmbeddingModelId,
    ) -> Result<(), KnowledgeError> {
        match &state.model {
            Some(stored) if !stored.is_compatible_with(configured) => {
                Err(self.mismatch(stored, configured))
            }
            _ => Ok(()),
        }
    }

    async fn write_manifest(&self, model: &EmbeddingModelId) -> Result<(), KnowledgeError> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&Manifest {
            embedding_model: model.clone(),
        })
        .map_err(|e| storage_err(&path, e))?;
        write_replace(&path, json.as_bytes()).await
    }

    async fn append_chunks(&self, chunks: &[KnowledgeChunk]) -> Result<(), KnowledgeError> {
        let path = self.dir.join(CHUNKS_FILE);
        let mut buf = String::new();
        for chunk in chunks {
            buf.push_str(&serde_json::to_string(chunk).map_err(|e| storage_err(&path, e))?);
            buf.push('\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| storage_err(&path, e))?;
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| storage_err(&path, e))?;
        file.flush().await.map_err(|e| storage_err(&path, e))
    }

    async fn rewrite_chunks(&self, chunks: &[KnowledgeChunk]) -> Result<(), KnowledgeError> {
        let path = self.dir.join(CHUNKS_FILE);
        let mut buf = String::new();
        for chunk in chunks {
            buf.push_str(&serde_json::to_string(chunk).map_err(|e| storage_err(&path, e))?);
            buf.push('\n');
        }
        write_replace(&path, buf.as_bytes()).await
    }
}

async fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), KnowledgeError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| storage_err(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| storage_err(path, e))
}

/// Knowledge store with one global partition and isolated project partitions
pub struct VectorKnowledgeStore {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    global: Arc<Partition>,
    projects: RwLock<HashMap<ProjectId, Arc<Partition>>>,
    capabilities: Option<Arc<dyn CapabilityRegistryPort>>,
    /// Ingestion order across partitions, for tie-breaking
    seq: AtomicU64,
}

impl VectorKnowledgeStore {
    /// Open the store with its global partition at `global_dir`
    pub async fn open(
        global_dir: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
    ) -> Result<Self, KnowledgeError> {
        let global = Partition::open(Scope::Global, global_dir.into()).await?;
        let seq = Partition::max_seq(&*global.state.read().await);
        Ok(Self {
            embedder,
            chunker,
            global: Arc::new(global),
            projects: RwLock::new(HashMap::new()),
            capabilities: None,
            seq: AtomicU64::new(seq),
        })
    }

    /// Consult plugin ingesters before the built-in ones
    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityRegistryPort>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Chunk counts per open scope
    pub async fn stats(&self) -> Vec<(Scope, usize, Option<EmbeddingModelId>)> {
        let mut partitions = vec![Arc::clone(&self.global)];
        partitions.extend(self.projects.read().await.values().cloned());
        let mut stats = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let state = partition.state.read().await;
            stats.push((partition.scope.clone(), state.chunks.len(), state.model.clone()));
        }
        stats
    }

    async fn partition(&self, scope: &Scope) -> Result<Arc<Partition>, KnowledgeError> {
        match scope {
            Scope::Global => Ok(Arc::clone(&self.global)),
            Scope::Project(id) => self
                .projects
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| KnowledgeError::UnknownScope(scope.to_string())),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn embed_checked(
        embedder: &dyn Embedder,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        let dimensions = embedder.model_id().dimensions;
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH) {
            let embedded = embedder.embed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(KnowledgeError::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            if let Some(bad) = embedded.iter().find(|v| v.len() != dimensions) {
                return Err(KnowledgeError::Embedding(format!(
                    "model {} returned {} dimensions",
                    embedder.model_id(),
                    bad.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    async fn ingest_file(
        &self,
        base: &Path,
        path: &Path,
        scope: &Scope,
    ) -> Result<IngestReport, KnowledgeError> {
        let id = document_id(base, path);
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| KnowledgeError::ingest(&id, e.to_string()))?;
        let document = extract_document(&id, path, &raw, self.capabilities.as_deref())?;
        self.ingest(document, scope).await
    }
}

#[async_trait]
impl KnowledgeStorePort for VectorKnowledgeStore {
    async fn open_project(&self, project: &ProjectId, dir: &Path) -> Result<(), KnowledgeError> {
        if self.projects.read().await.contains_key(project) {
            return Ok(());
        }
        let partition = Partition::open(Scope::Project(project.clone()), dir.to_path_buf()).await?;
        self.seq
            .fetch_max(Partition::max_seq(&*partition.state.read().await), Ordering::SeqCst);
        self.projects
            .write()
            .await
            .entry(project.clone())
            .or_insert_with(|| Arc::new(partition));
        Ok(())
    }

    async fn ingest(
        &self,
        document: Document,
        scope: &Scope,
    ) -> Result<IngestReport, KnowledgeError> {
        let partition = self.partition(scope).await?;
        let configured = self.embedder.model_id();

        let mut report = IngestReport {
            documents: 1,
            ..Default::default()
        };

        // Chunk and drop content already stored in this scope
        let mut seen = HashSet::new();
        let candidates: Vec<_> = {
            let state = partition.state.read().await;
            partition.check_model(&state, &configured)?;
            self.chunker
                .chunk_text(&document.text, document.kind.chunking_strategy())
                .into_iter()
                .filter_map(|(span, text)| {
                    let hash = content_hash(text);
                    if state.hashes.contains(&hash) || !seen.insert(hash.clone()) {
                        report.duplicates_skipped += 1;
                        None
                    } else {
                        Some((span, text.to_string(), hash))
                    }
                })
                .collect()
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let texts: Vec<String> = candidates.iter().map(|(_, text, _)| text.clone()).collect();
        let vectors = Self::embed_checked(self.embedder.as_ref(), &texts).await?;

        let mut state = partition.state.write().await;
        // Re-check: the lock was released while embedding
        partition.check_model(&state, &configured)?;
        let mut added = Vec::with_capacity(candidates.len());
        for ((span, text, hash), embedding) in candidates.into_iter().zip(vectors) {
            if state.hashes.contains(&hash) {
                report.duplicates_skipped += 1;
                continue;
            }
            added.push(KnowledgeChunk {
                document_id: document.id.clone(),
                span,
                text,
                embedding,
                content_hash: hash,
                scope: scope.clone(),
                seq: self.next_seq(),
            });
        }
        if added.is_empty() {
            return Ok(report);
        }

        if state.model.is_none() {
            partition.write_manifest(&configured).await?;
            state.model = Some(configured);
        }
        partition.append_chunks(&added).await?;
        report.chunks_added = added.len();
        for chunk in added {
            state.hashes.insert(chunk.content_hash.clone());
            state.chunks.push(chunk);
        }

        debug!(
            document = %document.id,
            scope = %scope,
            added = report.chunks_added,
            skipped = report.duplicates_skipped,
            "Ingested document"
        );
        Ok(report)
    }

    async fn ingest_path(
        &self,
        path: &Path,
        scope: &Scope,
    ) -> Result<IngestReport, KnowledgeError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| KnowledgeError::ingest(path.display().to_string(), e.to_string()))?;

        if metadata.is_file() {
            let base = path.parent().unwrap_or(Path::new(""));
            return self.ingest_file(base, path, scope).await;
        }

        // Make sure the scope exists before walking
        self.partition(scope).await?;

        let root = path.to_path_buf();
        let files = tokio::task::spawn_blocking(move || collect_files(&root))
            .await
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?;

        let mut report = IngestReport::default();
        for file in files {
            if !is_supported(&file, self.capabilities.as_deref()) {
                continue;
            }
            match self.ingest_file(path, &file, scope).await {
                Ok(file_report) => report.merge(file_report),
                Err(KnowledgeError::Ingest { document, reason }) => {
                    warn!(document = %document, reason = %reason, "Skipping document");
                    report.documents += 1;
                    report.failures.push((document, reason));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            path = %path.display(),
            scope = %scope,
            documents = report.documents,
            chunks = report.chunks_added,
            failures = report.failures.len(),
            "Ingested directory"
        );
        Ok(report)
    }

    async fn query(
        &self,
        text: &str,
        scope: &QueryScope,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, KnowledgeError> {
        if k == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut partitions = Vec::new();
        for scope in scope.scopes() {
            partitions.push(self.partition(&scope).await?);
        }

        let configured = self.embedder.model_id();
        let query = Self::embed_checked(self.embedder.as_ref(), &[text.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let mut hits = Vec::new();
        for partition in partitions {
            let state = partition.state.read().await;
            partition.check_model(&state, &configured)?;
            hits.extend(state.chunks.iter().map(|chunk| {
                RetrievedChunk::from_chunk(chunk, cosine_similarity(&query, &chunk.embedding))
            }));
        }
        Ok(rank_chunks(hits, k))
    }

    async fn rebuild(
        &self,
        scope: &Scope,
        embedder: Arc<dyn Embedder>,
    ) -> Result<usize, KnowledgeError> {
        let partition = self.partition(scope).await?;
        let model = embedder.model_id();

        let mut state = partition.state.write().await;
        let texts: Vec<String> = state.chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = Self::embed_checked(embedder.as_ref(), &texts).await?;

        let mut chunks = state.chunks.clone();
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }
        partition.rewrite_chunks(&chunks).await?;
        partition.write_manifest(&model).await?;

        let count = chunks.len();
        state.chunks = chunks;
        state.model = Some(model.clone());

        info!(scope = %scope, chunks = count, model = %model, "Rebuilt knowledge store");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::HashingEmbedder;
    use avakin_application::{RoleLease, RoleLeases};
    use avakin_domain::{
        AgentRole, AgentRoleProvider, DocumentKind, IngesterProvider, PluginError, ToolProvider,
    };

    async fn store(dir: &Path, dims: usize) -> VectorKnowledgeStore {
        VectorKnowledgeStore::open(
            dir.join("global"),
            Arc::new(HashingEmbedder::new(dims)),
            Chunker::default(),
        )
        .await
        .unwrap()
    }

    async fn with_projects(dir: &Path, ids: &[&str]) -> VectorKnowledgeStore {
        let store = store(dir, 64).await;
        for id in ids {
            store
                .open_project(&ProjectId::new(*id), &dir.join(id))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_project_queries_never_see_other_projects() {
        let dir = tempfile::tempdir().unwrap();
        let store = with_projects(dir.path(), &["alpha", "beta"]).await;
        store
            .ingest(Document::text("a.txt", "shared secret recipe"), &Scope::project("alpha"))
            .await
            .unwrap();
        store
            .ingest(Document::text("b.txt", "shared secret recipe"), &Scope::project("beta"))
            .await
            .unwrap();

        let hits = store
            .query("secret recipe", &QueryScope::project("alpha"), 10)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].scope, Scope::project("alpha"));
    }

    #[tokio::test]
    async fn test_global_chunks_join_project_results_unless_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = with_projects(dir.path(), &["alpha"]).await;
        store
            .ingest(Document::text("style.md", "always use type hints"), &Scope::Global)
            .await
            .unwrap();
        store
            .ingest(Document::text("main.py", "def main(): pass"), &Scope::project("alpha"))
            .await
            .unwrap();

        let both = store
            .query("type hints main", &QueryScope::project("alpha"), 5)
            .await
            .unwrap();
        let project_only = store
            .query("type hints main", &QueryScope::project("alpha").without_global(), 5)
            .await
            .unwrap();

        assert_eq!(both.len(), 2);
        assert_eq!(project_only.len(), 1);
        assert_eq!(project_only[0].document_id, "main.py");
    }

    #[tokio::test]
    async fn test_ties_prefer_most_recently_ingested() {
        let dir = tempfile::tempdir().unwrap();
        let store = with_projects(dir.path(), &["alpha"]).await;
        let scope = Scope::project("alpha");
        store
            .ingest(Document::text("first.txt", "Alpha beta"), &scope)
            .await
            .unwrap();
        store
            .ingest(Document::text("second.txt", "alpha BETA"), &scope)
            .await
            .unwrap();

        let hits = store
            .query("alpha beta", &QueryScope::project("alpha"), 2)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert!((hits[0].score - hits[1].score).abs() < 1e-6);
        assert_eq!(hits[0].document_id, "second.txt");
    }

    #[tokio::test]
    async fn test_identical_content_is_stored_once_per_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = with_projects(dir.path(), &["alpha"]).await;
        let doc = Document::text("notes.txt", "remember the milk");

        let first = store.ingest(doc.clone(), &Scope::project("alpha")).await.unwrap();
        let again = store.ingest(doc.clone(), &Scope::project("alpha")).await.unwrap();
        let global = store.ingest(doc, &Scope::Global).await.unwrap();

        assert_eq!(first.chunks_added, 1);
        assert_eq!(again.chunks_added, 0);
        assert_eq!(again.duplicates_skipped, 1);
        assert_eq!(global.chunks_added, 1);
    }

    #[tokio::test]
    async fn test_unopened_project_is_unknown_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 64).await;

        let err = store
            .query("anything", &QueryScope::project("ghost"), 3)
            .await
            .unwrap_err();

        assert!(matches!(err, KnowledgeError::UnknownScope(_)));
    }

    #[tokio::test]
    async fn test_chunks_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = with_projects(dir.path(), &["alpha"]).await;
            store
                .ingest(Document::text("a.txt", "persistent fact"), &Scope::project("alpha"))
                .await
                .unwrap();
        }

        let store = with_projects(dir.path(), &["alpha"]).await;
        let hits = store
            .query("persistent fact", &QueryScope::project("alpha"), 1)
            .await
            .unwrap();
        store
            .ingest(Document::text("b.txt", "newer fact"), &Scope::project("alpha"))
            .await
            .unwrap();
        let newer = store
            .query("newer fact", &QueryScope::project("alpha"), 2)
            .await
            .unwrap();

        assert_eq!(hits[0].document_id, "a.txt");
        assert!(newer.iter().all(|h| h.seq >= 1));
        assert!(newer.iter().any(|h| h.document_id == "b.txt" && h.seq > hits[0].seq));
        assert!(dir.path().join("alpha").join(MANIFEST_FILE).exists());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_until_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store(dir.path(), 64).await;
            store
                .ingest(Document::text("a.txt", "vector content"), &Scope::Global)
                .await
                .unwrap();
        }

        let store = store(dir.path(), 32).await;
        let ingest_err = store
            .ingest(Document::text("b.txt", "more"), &Scope::Global)
            .await
            .unwrap_err();
        let query_err = store
            .query("vector", &QueryScope::global_only(), 1)
            .await
            .unwrap_err();
        assert!(matches!(ingest_err, KnowledgeError::EmbeddingModelMismatch { .. }));
        assert!(matches!(query_err, KnowledgeError::EmbeddingModelMismatch { .. }));

        let rebuilt = store.rebuild(&Scope::Global, store.embedder()).await.unwrap();
        let hits = store
            .query("vector content", &QueryScope::global_only(), 1)
            .await
            .unwrap();

        assert_eq!(rebuilt, 1);
        assert_eq!(hits[0].document_id, "a.txt");
    }

    #[tokio::test]
    async fn test_directory_ingest_skips_ignored_dirs_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = with_projects(dir.path(), &["alpha"]).await;
        let src = dir.path().join("src");
        for (path, content) in [
            ("app.py", b"def run():\n    return 1\n".as_slice()),
            ("README.md", b"# Readme\nUsage notes".as_slice()),
            ("broken.py", &[0xff, 0xfe, 0xfd][..]),
            ("logo.png", b"\x89PNG".as_slice()),
            ("node_modules/dep/index.js", b"module.exports = 1".as_slice()),
            (".avakin/blueprint.json", b"{}".as_slice()),
        ] {
            let full = src.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }

        let report = store.ingest_path(&src, &Scope::project("alpha")).await.unwrap();

        assert_eq!(report.documents, 3);
        assert_eq!(report.chunks_added, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "broken.py");
    }

    #[tokio::test]
    async fn test_single_unsupported_file_is_ingest_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 64).await;
        let path = dir.path().join("image.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let err = store.ingest_path(&path, &Scope::Global).await.unwrap_err();

        assert!(matches!(err, KnowledgeError::Ingest { ref document, .. } if document == "image.png"));
    }

    struct CsvIngester;

    impl IngesterProvider for CsvIngester {
        fn name(&self) -> &str {
            "tsv"
        }

        fn handles(&self, path: &Path) -> bool {
            path.extension().is_some_and(|e| e == "tsv")
        }

        fn extract(&self, id: &str, _path: &Path, raw: &[u8]) -> Result<Document, PluginError> {
            let text = String::from_utf8_lossy(raw).replace('\t', " | ");
            Ok(Document::new(id, DocumentKind::Text, text))
        }
    }

    struct IngesterOnly {
        leases: RoleLeases,
    }

    impl CapabilityRegistryPort for IngesterOnly {
        fn agent_roles(&self) -> Vec<Arc<dyn AgentRoleProvider>> {
            Vec::new()
        }

        fn tools(&self) -> Vec<Arc<dyn ToolProvider>> {
            Vec::new()
        }

        fn ingesters(&self) -> Vec<Arc<dyn IngesterProvider>> {
            vec![Arc::new(CsvIngester)]
        }

        fn lease_roles(&self, roles: &[AgentRole]) -> RoleLease {
            self.leases.acquire(roles)
        }
    }

    #[tokio::test]
    async fn test_plugin_ingester_handles_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 64).await.with_capabilities(Arc::new(IngesterOnly {
            leases: RoleLeases::new(),
        }));
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("prices.tsv"), "apple\t3\npear\t5").unwrap();

        let report = store.ingest_path(&data, &Scope::Global).await.unwrap();
        let hits = store
            .query("apple", &QueryScope::global_only(), 1)
            .await
            .unwrap();

        assert_eq!(report.chunks_added, 1);
        assert!(hits[0].text.contains("apple | 3"));
    }
}
