//! Unified diffs of files changed by a run

use avakin_application::WorkspacePort;
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;

/// Files larger than this are not captured for diffing
const MAX_SNAPSHOT_BYTES: usize = 256 * 1024;
const MAX_SNAPSHOT_FILES: usize = 500;

/// Contents of the project files before a run, to diff against afterwards
#[derive(Debug, Default)]
pub struct FileSnapshot {
    files: HashMap<String, String>,
}

impl FileSnapshot {
    /// Capture the current project files. Unreadable files are skipped.
    pub async fn capture(workspace: &dyn WorkspacePort) -> Self {
        let mut files = HashMap::new();
        let Ok(paths) = workspace.list_files().await else {
            return Self::default();
        };
        for path in paths.into_iter().take(MAX_SNAPSHOT_FILES) {
            if let Ok(Some(content)) = workspace.read_file(&path).await
                && content.len() <= MAX_SNAPSHOT_BYTES
            {
                files.insert(path, content);
            }
        }
        Self { files }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Colored diffs of `paths` against their current content
    pub async fn diffs(&self, workspace: &dyn WorkspacePort, paths: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for path in paths {
            let after = match workspace.read_file(path).await {
                Ok(Some(content)) => content,
                _ => continue,
            };
            let diff = render_diff(path, self.get(path).unwrap_or(""), &after);
            if !diff.is_empty() {
                out.push(diff);
            }
        }
        out
    }
}

/// Colored unified diff with 3 lines of context; empty when unchanged
pub fn render_diff(path: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        output.push_str(&format!("{}\n", hunk.header().to_string().cyan()));
        for change in hunk.iter_changes() {
            let line = change.to_string_lossy();
            let line = line.trim_end_matches('\n');
            let rendered = match change.tag() {
                ChangeTag::Delete => format!("-{}", line).red().to_string(),
                ChangeTag::Insert => format!("+{}", line).green().to_string(),
                ChangeTag::Equal => format!(" {}", line),
            };
            output.push_str(&rendered);
            output.push('\n');
        }
    }
    if output.is_empty() {
        return String::new();
    }
    let header = if old.is_empty() {
        format!("{} {}", "new file".green().bold(), path.bold())
    } else {
        format!("{} {}", "modified".yellow().bold(), path.bold())
    };
    format!("{}\n{}", header, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_diff_marks_changes() {
        colored::control::set_override(false);
        let diff = render_diff("main.py", "a\nb\nc\n", "a\nB\nc\n");
        assert!(diff.starts_with("modified main.py"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+B\n"));
        assert!(diff.contains(" a\n"));
    }

    #[test]
    fn test_render_diff_empty_when_unchanged() {
        assert!(render_diff("main.py", "same\n", "same\n").is_empty());
    }

    #[test]
    fn test_new_file_header() {
        colored::control::set_override(false);
        let diff = render_diff("utils.py", "", "def f():\n    pass\n");
        assert!(diff.starts_with("new file utils.py"));
        assert!(diff.contains("+def f():"));
    }
}
