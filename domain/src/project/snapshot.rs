//! Read-only project context and file writes

use super::conversation::ConversationTurn;
use crate::blueprint::validate_relative_path;
use crate::blueprint::BlueprintError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file produced by a stage. Paths are project-relative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWrite {
    pub path: String,
    pub content: String,
}

impl FileWrite {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<(), BlueprintError> {
        validate_relative_path(&self.path)
    }
}

/// Snapshot of the project handed to each stage invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectSnapshot {
    pub root: PathBuf,
    /// Project-relative file paths, sorted
    pub files: Vec<String>,
    pub history: Vec<ConversationTurn>,
    pub git_diff: Option<String>,
    pub last_error: Option<String>,
}

impl ProjectSnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.binary_search_by(|f| f.as_str().cmp(path)).is_ok()
    }

    /// Indented listing capped at `max_entries`
    pub fn file_tree(&self, max_entries: usize) -> String {
        let mut out: Vec<String> = self
            .files
            .iter()
            .take(max_entries)
            .map(|f| format!("- {}", f))
            .collect();
        if self.files.len() > max_entries {
            out.push(format!("- ... ({} more)", self.files.len() - max_entries));
        }
        out.join("\n")
    }
}
