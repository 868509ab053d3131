//! Document extraction and directory collection

use avakin_application::{CapabilityRegistryPort, KnowledgeError};
use avakin_domain::{Document, DocumentKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories never ingested
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".avakin",
    "target",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
];

pub fn should_skip_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name) || name.ends_with(".egg-info")
}

/// Files under `root`, skipping ignored directories, in walk order
pub(crate) fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && entry.file_name().to_str().is_some_and(should_skip_dir))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Document id: `path` relative to `base`, `/`-separated
pub(crate) fn document_id(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether some ingester (plugin or built-in) understands `path`
pub(crate) fn is_supported(path: &Path, capabilities: Option<&dyn CapabilityRegistryPort>) -> bool {
    DocumentKind::from_path(path).is_some()
        || capabilities.is_some_and(|c| c.ingesters().iter().any(|i| i.handles(path)))
}

/// Decode raw bytes into a document. Plugin ingesters take precedence.
pub(crate) fn extract_document(
    id: &str,
    path: &Path,
    raw: &[u8],
    capabilities: Option<&dyn CapabilityRegistryPort>,
) -> Result<Document, KnowledgeError> {
    if let Some(ingester) =
        capabilities.and_then(|c| c.ingesters().into_iter().find(|i| i.handles(path)))
    {
        return ingester
            .extract(id, path, raw)
            .map_err(|e| KnowledgeError::ingest(id, e.to_string()));
    }

    let kind = DocumentKind::from_path(path)
        .ok_or_else(|| KnowledgeError::ingest(id, "unsupported file type"))?;
    let text = std::str::from_utf8(raw)
        .map_err(|_| KnowledgeError::ingest(id, "not valid UTF-8 text"))?;

    let text = match kind {
        DocumentKind::Notebook => notebook_text(text).map_err(|e| KnowledgeError::ingest(id, e))?,
        _ => text.to_string(),
    };
    Ok(Document::new(id, kind, text))
}

#[derive(Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Deserialize)]
struct NotebookCell {
    #[serde(default)]
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

#[derive(Deserialize, Default)]
#[serde(untagged)]
enum CellSource {
    Lines(Vec<String>),
    Text(String),
    #[default]
    Empty,
}

/// Code and markdown cell sources, one block per cell
fn notebook_text(raw: &str) -> Result<String, String> {
    let notebook: Notebook =
        serde_json::from_str(raw).map_err(|e| format!("invalid notebook JSON: {}", e))?;
    let blocks: Vec<String> = notebook
        .cells
        .into_iter()
        .filter(|cell| cell.cell_type == "code" || cell.cell_type == "markdown")
        .map(|cell| match cell.source {
            CellSource::Lines(lines) => lines.concat(),
            CellSource::Text(text) => text,
            CellSource::Empty => String::new(),
        })
        .filter(|block| !block.trim().is_empty())
        .collect();
    Ok(blocks.join("\n\n"))
}
