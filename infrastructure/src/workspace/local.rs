//! [`WorkspacePort`] over a directory on disk.
//!
//! Commits are staged to sibling temp files and renamed into place; if any
//! step fails, already-replaced files are restored from memory so the tree
//! never holds a partial stage. Each committed stage is then recorded as a
//! git commit of exactly its files, so `git diff HEAD` shows what changed
//! since Avakin last wrote the tree.

use async_trait::async_trait;
use avakin_application::{WorkspaceError, WorkspacePort};
use avakin_domain::{Blueprint, FileWrite};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Per-project state directory (blueprint, knowledge store, transcript)
pub const STATE_DIR: &str = ".avakin";

const BLUEPRINT_FILE: &str = "blueprint.json";

/// Identity for commits the pipeline makes
const GIT_IDENTITY: [&str; 4] = ["-c", "user.name=Avakin", "-c", "user.email=avakin@localhost"];

/// Directories never listed as project files
const SKIP_DIRS: &[&str] = &[
    STATE_DIR,
    ".git",
    "target",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
];

pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blueprint_path(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(BLUEPRINT_FILE)
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output, WorkspaceError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| WorkspaceError::Git(e.to_string()))
    }

    async fn in_work_tree(&self) -> bool {
        self.git(&["rev-parse", "--is-inside-work-tree"])
            .await
            .is_ok_and(|output| output.status.success())
    }

    /// Commit exactly `paths`, creating the repository on first use.
    /// Unchanged content makes no commit.
    async fn record_in_git(&self, paths: &[&str]) -> Result<(), WorkspaceError> {
        if !self.in_work_tree().await {
            git_checked(self.git(&["init", "--quiet"]).await?)?;
            info!(root = %self.root.display(), "Initialised git repository");
        }

        let mut add: Vec<&str> = vec!["add", "--"];
        add.extend_from_slice(paths);
        git_checked(self.git(&add).await?)?;

        let mut staged: Vec<&str> = vec!["diff", "--cached", "--quiet", "--"];
        staged.extend_from_slice(paths);
        if self.git(&staged).await?.status.success() {
            debug!("No content change, skipping git commit");
            return Ok(());
        }

        let message = format!("avakin: update {}", paths.join(", "));
        let mut commit: Vec<&str> = GIT_IDENTITY.to_vec();
        commit.extend_from_slice(&["commit", "--quiet", "-m", message.as_str(), "--"]);
        commit.extend_from_slice(paths);
        git_checked(self.git(&commit).await?)
    }
}

fn git_checked(output: std::process::Output) -> Result<(), WorkspaceError> {
    if output.status.success() {
        return Ok(());
    }
    Err(WorkspaceError::Git(
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    ))
}

fn io_err(context: &str, e: std::io::Error) -> WorkspaceError {
    WorkspaceError::Io(format!("{}: {}", context, e))
}

pub(crate) fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

fn list_sorted(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry.file_name().to_str().is_some_and(is_skipped_dir))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let parts: Vec<&str> = relative
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect::<Option<_>>()?;
            Some(parts.join("/"))
        })
        .collect();
    files.sort();
    files
}

fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    target.with_file_name(format!(".{}.avakin-tmp", name))
}

/// Stage every write, then swap them in; undo on any failure.
fn commit_blocking(root: &Path, writes: &[FileWrite]) -> Result<(), WorkspaceError> {
    let targets: Vec<PathBuf> = writes.iter().map(|w| root.join(&w.path)).collect();

    let mut staged: Vec<PathBuf> = Vec::with_capacity(writes.len());
    for (write, target) in writes.iter().zip(&targets) {
        let tmp = temp_path(target);
        let result = target
            .parent()
            .map_or(Ok(()), |parent| std::fs::create_dir_all(parent))
            .and_then(|_| std::fs::write(&tmp, &write.content));
        if let Err(e) = result {
            for tmp in &staged {
                let _ = std::fs::remove_file(tmp);
            }
            let _ = std::fs::remove_file(&tmp);
            return Err(WorkspaceError::CommitFailed(format!(
                "staging {}: {}",
                write.path, e
            )));
        }
        staged.push(tmp);
    }

    // Original content of each replaced target (None = did not exist)
    let mut swapped: Vec<(usize, Option<Vec<u8>>)> = Vec::with_capacity(writes.len());
    for (index, (tmp, target)) in staged.iter().zip(&targets).enumerate() {
        let original = std::fs::read(target).ok();
        if let Err(e) = std::fs::rename(tmp, target) {
            for (done, original) in swapped.iter().rev() {
                let restored = match original {
                    Some(bytes) => std::fs::write(&targets[*done], bytes),
                    None => std::fs::remove_file(&targets[*done]),
                };
                if let Err(restore_err) = restored {
                    warn!(path = %targets[*done].display(), error = %restore_err, "Rollback failed");
                }
            }
            for tmp in &staged[index..] {
                let _ = std::fs::remove_file(tmp);
            }
            return Err(WorkspaceError::CommitFailed(format!(
                "replacing {}: {}",
                writes[index].path, e
            )));
        }
        swapped.push((index, original));
    }

    Ok(())
}

#[async_trait]
impl WorkspacePort for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn list_files(&self) -> Result<Vec<String>, WorkspaceError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_sorted(&root))
            .await
            .map_err(|e| WorkspaceError::Io(e.to_string()))
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, WorkspaceError> {
        avakin_domain::validate_relative_path(path).map_err(|e| WorkspaceError::InvalidPath {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        match tokio::fs::read(self.root.join(path)).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path, e)),
        }
    }

    async fn commit(&self, writes: &[FileWrite]) -> Result<(), WorkspaceError> {
        for write in writes {
            write.validate().map_err(|e| WorkspaceError::InvalidPath {
                path: write.path.clone(),
                reason: e.to_string(),
            })?;
        }
        if writes.is_empty() {
            return Ok(());
        }

        let root = self.root.clone();
        let owned = writes.to_vec();
        tokio::task::spawn_blocking(move || commit_blocking(&root, &owned))
            .await
            .map_err(|e| WorkspaceError::Io(e.to_string()))??;

        debug!(files = writes.len(), root = %self.root.display(), "Committed stage writes");

        // The tree is already consistent; history is best effort
        let paths: Vec<&str> = writes.iter().map(|w| w.path.as_str()).collect();
        if let Err(e) = self.record_in_git(&paths).await {
            warn!(error = %e, "Could not record stage in git");
        }
        Ok(())
    }

    async fn git_diff(&self) -> Result<Option<String>, WorkspaceError> {
        // Not a repository, or git is not installed
        if !self.in_work_tree().await {
            return Ok(None);
        }

        let output = self.git(&["diff", "HEAD"]).await?;
        if !output.status.success() {
            // A repository without commits has no HEAD to diff against
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("HEAD") {
                return Ok(None);
            }
            return Err(WorkspaceError::Git(stderr.trim().to_string()));
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    async fn save_blueprint(&self, blueprint: &Blueprint) -> Result<(), WorkspaceError> {
        let path = self.blueprint_path();
        let json = serde_json::to_string_pretty(blueprint)
            .map_err(|e| WorkspaceError::Io(e.to_string()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(STATE_DIR, e))?;
        }
        let tmp = temp_path(&path);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_err(BLUEPRINT_FILE, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err(BLUEPRINT_FILE, e))
    }

    async fn load_blueprint(&self) -> Result<Option<Blueprint>, WorkspaceError> {
        let text = match tokio::fs::read_to_string(self.blueprint_path()).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(BLUEPRINT_FILE, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| WorkspaceError::Io(format!("{}: {}", BLUEPRINT_FILE, e)))
    }
}
