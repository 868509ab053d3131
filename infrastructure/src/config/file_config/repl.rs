//! REPL configuration from TOML (`[repl]` section)

use serde::{Deserialize, Serialize};

/// Raw REPL configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileReplConfig {
    /// Show stage spinners and per-file progress during build runs
    pub show_progress: bool,
    /// Path to history file (default: `<data dir>/avakin/history.txt`)
    pub history_file: Option<String>,
    /// Print a unified diff for every file a run commits
    pub show_diffs: bool,
}

impl Default for FileReplConfig {
    fn default() -> Self {
        Self {
            show_progress: true,
            history_file: None,
            show_diffs: true,
        }
    }
}
