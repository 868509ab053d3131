//! Presentation-level configuration
//!
//! Configuration for REPL behavior.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// REPL configuration for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Show progress indicators
    pub show_progress: bool,
    /// Path to history file
    pub history_file: Option<String>,
    /// Print a diff of every file a run changed
    pub show_diffs: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            show_progress: true,
            history_file: None,
            show_diffs: true,
        }
    }
}

impl ReplConfig {
    /// Configured history file, else `<data dir>/avakin/history.txt`
    pub fn history_path(&self) -> Option<PathBuf> {
        match &self.history_file {
            Some(path) => Some(PathBuf::from(path)),
            None => dirs::data_dir().map(|p| p.join("avakin").join("history.txt")),
        }
    }
}
