//! Dual-scope vector knowledge store
//!
//! One [`VectorKnowledgeStore`] holds the global partition and every opened
//! project partition. Each partition is a directory with `manifest.json`
//! (embedding model) and an append-only `chunks.jsonl`.

mod embedding;
mod ingest;
mod store;

pub use embedding::{HashingEmbedder, OllamaEmbedder, embedder_from_config};
pub use ingest::should_skip_dir;
pub use store::VectorKnowledgeStore;
