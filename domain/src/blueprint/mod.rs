//! Blueprint: the structured output of Plan mode
//!
//! The Architect drafts blueprint *fragments* during the Plan-mode
//! conversation; fragments are merged into the project's draft. Build mode
//! consumes a validated blueprint and never mutates it.

use crate::response::extract_json;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path};
use thiserror::Error;

/// Blueprint validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlueprintError {
    #[error("Blueprint has an empty file plan")]
    EmptyFilePlan,

    #[error("Invalid file path in plan: {0}")]
    InvalidPath(String),

    #[error("Duplicate file path in plan: {0}")]
    DuplicatePath(String),

    #[error("No blueprint has been drafted yet")]
    Missing,
}

/// One planned file or module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePlanEntry {
    /// Project-relative path
    #[serde(alias = "filename")]
    pub path: String,
    /// What the file is for
    #[serde(default)]
    pub purpose: String,
}

impl FilePlanEntry {
    pub fn new(path: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            purpose: purpose.into(),
        }
    }
}

/// Structured technical plan produced in Plan mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Blueprint {
    pub summary: String,
    pub features: Vec<String>,
    pub files: Vec<FilePlanEntry>,
    pub constraints: Vec<String>,
}

impl Blueprint {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, purpose: impl Into<String>) -> Self {
        self.files.push(FilePlanEntry::new(path, purpose));
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    /// Validate the minimal schema required before Build mode may start
    pub fn validate(&self) -> Result<(), BlueprintError> {
        if self.files.is_empty() {
            return Err(BlueprintError::EmptyFilePlan);
        }
        let mut seen = HashSet::new();
        for entry in &self.files {
            validate_relative_path(&entry.path)?;
            if !seen.insert(entry.path.as_str()) {
                return Err(BlueprintError::DuplicatePath(entry.path.clone()));
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Merge an Architect fragment into this draft.
    ///
    /// File entries with the same path are replaced in place; new paths are
    /// appended. Features and constraints are de-duplicated.
    pub fn merge(&mut self, fragment: Blueprint) {
        if !fragment.summary.trim().is_empty() {
            self.summary = fragment.summary;
        }
        for feature in fragment.features {
            if !self.features.contains(&feature) {
                self.features.push(feature);
            }
        }
        for constraint in fragment.constraints {
            if !self.constraints.contains(&constraint) {
                self.constraints.push(constraint);
            }
        }
        for entry in fragment.files {
            match self.files.iter_mut().find(|f| f.path == entry.path) {
                Some(existing) => *existing = entry,
                None => self.files.push(entry),
            }
        }
    }

    pub fn file_paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn purpose_of(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.purpose.as_str())
    }

    /// Markdown rendering used in prompts and chat replies
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        if !self.summary.is_empty() {
            out.push_str(&format!("## Summary\n{}\n\n", self.summary));
        }
        if !self.features.is_empty() {
            out.push_str("## Features\n");
            for feature in &self.features {
                out.push_str(&format!("- {}\n", feature));
            }
            out.push('\n');
        }
        out.push_str("## Files\n");
        for entry in &self.files {
            out.push_str(&format!("- `{}`: {}\n", entry.path, entry.purpose));
        }
        if !self.constraints.is_empty() {
            out.push_str("\n## Constraints\n");
            for constraint in &self.constraints {
                out.push_str(&format!("- {}\n", constraint));
            }
        }
        out
    }
}

/// Check that a plan path is relative and stays inside the project root
pub fn validate_relative_path(path: &str) -> Result<(), BlueprintError> {
    if path.trim().is_empty() {
        return Err(BlueprintError::InvalidPath(path.to_string()));
    }
    let escapes = Path::new(path).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(BlueprintError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Parse a blueprint fragment from model response text.
///
/// Accepts a fenced ` ```json ` block, raw JSON, or the first JSON object
/// embedded in prose. Returns `None` when no object with at least one of the
/// blueprint fields is found.
pub fn parse_blueprint(response: &str) -> Option<Blueprint> {
    let json = extract_json(response)?;
    let object = json.as_object()?;
    let known = ["summary", "features", "files", "constraints"];
    if !known.iter().any(|k| object.contains_key(*k)) {
        return None;
    }
    serde_json::from_value(json).ok()
}
