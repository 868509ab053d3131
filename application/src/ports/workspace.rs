//! Project workspace port
//!
//! The only way the pipeline mutates a project tree is [`WorkspacePort::commit`],
//! which applies all of a stage's writes or none of them.

use async_trait::async_trait;
use avakin_domain::{Blueprint, FileWrite};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Commit failed and was rolled back: {0}")]
    CommitFailed(String),

    #[error("Workspace I/O error: {0}")]
    Io(String),

    #[error("git failed: {0}")]
    Git(String),
}

#[async_trait]
pub trait WorkspacePort: Send + Sync {
    fn root(&self) -> &Path;

    /// Project-relative file paths, sorted, excluding VCS and state dirs
    async fn list_files(&self) -> Result<Vec<String>, WorkspaceError>;

    async fn read_file(&self, path: &str) -> Result<Option<String>, WorkspaceError>;

    /// Apply all writes atomically
    async fn commit(&self, writes: &[FileWrite]) -> Result<(), WorkspaceError>;

    /// Uncommitted changes; `None` outside a git repository
    async fn git_diff(&self) -> Result<Option<String>, WorkspaceError>;

    async fn save_blueprint(&self, blueprint: &Blueprint) -> Result<(), WorkspaceError>;

    async fn load_blueprint(&self) -> Result<Option<Blueprint>, WorkspaceError>;
}
