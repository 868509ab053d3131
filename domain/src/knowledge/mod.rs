//! Knowledge domain module
//!
//! Value objects and pure logic behind the dual-context retrieval store:
//! scopes, documents and chunks, the file-type-aware chunker and similarity
//! ranking. Storage and embedding live in infrastructure.

pub mod chunking;
pub mod entities;
pub mod scope;
pub mod similarity;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the embedding model that produced a store's vectors.
///
/// A store holds vectors from exactly one model; two ids with different
/// dimensions can never share a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingModelId {
    pub name: String,
    pub dimensions: usize,
}

impl EmbeddingModelId {
    pub fn new(name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            dimensions,
        }
    }

    /// Whether vectors from `other` may be mixed with vectors from `self`
    pub fn is_compatible_with(&self, other: &EmbeddingModelId) -> bool {
        self.dimensions == other.dimensions && self.name == other.name
    }
}

impl fmt::Display for EmbeddingModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dims)", self.name, self.dimensions)
    }
}
