//! Documents and chunks

use super::chunking::{ChunkingStrategy, TextSpan};
use super::scope::Scope;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Broad document category, decides the chunking strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Code { language: String },
    Markdown,
    Notebook,
    Text,
}

impl DocumentKind {
    /// Classify a file by extension. Returns `None` for binary or unknown
    /// formats that no built-in ingester understands.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let kind = match ext.as_str() {
            "md" | "markdown" => DocumentKind::Markdown,
            "ipynb" => DocumentKind::Notebook,
            "txt" | "rst" | "text" | "csv" | "log" => DocumentKind::Text,
            "toml" | "yaml" | "yml" | "json" | "cfg" | "ini" => DocumentKind::Text,
            "py" => DocumentKind::code("python"),
            "rs" => DocumentKind::code("rust"),
            "js" | "mjs" | "cjs" => DocumentKind::code("javascript"),
            "ts" | "tsx" => DocumentKind::code("typescript"),
            "go" => DocumentKind::code("go"),
            "java" => DocumentKind::code("java"),
            "c" | "h" => DocumentKind::code("c"),
            "cpp" | "cc" | "hpp" => DocumentKind::code("cpp"),
            "rb" => DocumentKind::code("ruby"),
            "sh" | "bash" => DocumentKind::code("shell"),
            "html" | "css" => DocumentKind::code(ext.as_str()),
            _ => return None,
        };
        Some(kind)
    }

    pub fn code(language: impl Into<String>) -> Self {
        DocumentKind::Code {
            language: language.into(),
        }
    }

    pub fn chunking_strategy(&self) -> ChunkingStrategy {
        match self {
            DocumentKind::Code { .. } => ChunkingStrategy::Code,
            DocumentKind::Markdown => ChunkingStrategy::Markdown,
            DocumentKind::Notebook | DocumentKind::Text => ChunkingStrategy::Text,
        }
    }
}

/// A unit of ingestion: already decoded to text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable id, normally the path relative to the ingestion root
    pub id: String,
    pub kind: DocumentKind,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
        }
    }

    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, DocumentKind::Text, text)
    }
}

/// One stored chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub document_id: String,
    pub span: TextSpan,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Hex SHA-256 of `text`; unique within a scope
    pub content_hash: String,
    pub scope: Scope,
    /// Monotonic per-store ingestion order, used to break score ties
    pub seq: u64,
}

/// A chunk returned by a query with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub document_id: String,
    pub text: String,
    pub scope: Scope,
    pub score: f32,
    pub seq: u64,
}

impl RetrievedChunk {
    pub fn from_chunk(chunk: &KnowledgeChunk, score: f32) -> Self {
        Self {
            document_id: chunk.document_id.clone(),
            text: chunk.text.clone(),
            scope: chunk.scope.clone(),
            score,
            seq: chunk.seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            DocumentKind::from_path(Path::new("src/main.py")),
            Some(DocumentKind::code("python"))
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("README.MD")),
            Some(DocumentKind::Markdown)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("nb.ipynb")),
            Some(DocumentKind::Notebook)
        );
        assert_eq!(DocumentKind::from_path(Path::new("image.png")), None);
        assert_eq!(DocumentKind::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_strategy_by_kind() {
        assert_eq!(
            DocumentKind::code("rust").chunking_strategy(),
            ChunkingStrategy::Code
        );
        assert_eq!(
            DocumentKind::Markdown.chunking_strategy(),
            ChunkingStrategy::Markdown
        );
        assert_eq!(DocumentKind::Text.chunking_strategy(), ChunkingStrategy::Text);
    }
}
