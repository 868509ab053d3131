//! Plugin configuration from TOML (`[plugins]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePluginsConfig {
    /// Plugins shipped with the binary (default: `<exe dir>/plugins`)
    pub builtin_dir: Option<String>,
    /// User plugins (default: `<config dir>/avakin/plugins`)
    pub user_dir: Option<String>,
    /// Enable/disable state (default: `<config dir>/avakin/plugins.json`)
    pub state_file: Option<String>,
}

impl FilePluginsConfig {
    /// Directories scanned for `plugin.toml` manifests, built-in first
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let builtin = self.builtin_dir.as_ref().map(PathBuf::from).or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join("plugins")))
        });
        let user = self
            .user_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| avakin_config_dir().join("plugins"));
        builtin.into_iter().chain(std::iter::once(user)).collect()
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| avakin_config_dir().join("plugins.json"))
    }
}

fn avakin_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("avakin")
}
