//! Logging configuration from TOML (`[logging]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// Directory for the daily tracing log (default: `<data dir>/avakin/logs`)
    pub log_dir: Option<String>,
    /// Write a JSONL conversation log per project under `.avakin/logs`
    pub conversation_log: bool,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            conversation_log: true,
        }
    }
}

impl FileLoggingConfig {
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.as_ref().map(PathBuf::from).unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("avakin")
                .join("logs")
        })
    }
}
