//! Configuration file loader with multi-source merging

use super::file_config::{FileConfig, GLOBAL_DB_ENV};
use avakin_domain::{AgentRole, RoleBinding};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Project-level config file name
pub const PROJECT_CONFIG_FILE: &str = "avakin.toml";

#[derive(Error, Debug)]
pub enum ConfigSaveError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `GLOBAL_RAG_DB_PATH` (global store location only)
    /// 2. `AVAKIN_*` environment variables (`AVAKIN_ROUTER__TIMEOUT_SECS=30`)
    /// 3. Explicit config path (if provided)
    /// 4. Project root: `<project>/avakin.toml`
    /// 5. Global: `$XDG_CONFIG_HOME/avakin/config.toml`
    /// 6. Default values
    pub fn load(
        project_root: Option<&Path>,
        config_path: Option<&Path>,
    ) -> Result<FileConfig, Box<figment::Error>> {
        let mut figment = Self::files(project_root, config_path)
            .merge(Env::prefixed("AVAKIN_").split("__"));

        if let Ok(path) = std::env::var(GLOBAL_DB_ENV)
            && !path.trim().is_empty()
        {
            figment = figment.merge(Serialized::default("knowledge.global_db_path", path));
        }

        figment.extract().map_err(Box::new)
    }

    /// Defaults merged with config files only, without the environment
    fn files(project_root: Option<&Path>, config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(&global_path));
        }

        if let Some(path) = project_root.and_then(Self::project_config_path) {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// Get the global config file path
    ///
    /// Returns XDG_CONFIG_HOME/avakin/config.toml if set,
    /// otherwise falls back to ~/.config/avakin/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("avakin").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path(project_root: &Path) -> Option<PathBuf> {
        let path = project_root.join(PROJECT_CONFIG_FILE);
        path.exists().then_some(path)
    }

    /// Persist role bindings to `path`, replacing its `[models]` table and
    /// leaving every other section untouched.
    pub fn save_bindings<'a>(
        path: &Path,
        bindings: impl IntoIterator<Item = (&'a AgentRole, &'a RoleBinding)>,
    ) -> Result<(), ConfigSaveError> {
        let mut document: toml::Table = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigSaveError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&text).map_err(|source| ConfigSaveError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            toml::Table::new()
        };

        let mut models = FileConfig::default();
        models.set_bindings(bindings);
        document.insert("models".to_string(), toml::Value::try_from(&models.models)?);

        let text = toml::to_string_pretty(&document)?;
        write_atomic(path, &text).map_err(|source| ConfigSaveError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "Saved model bindings");
        Ok(())
    }

    /// Print the config file locations being used (for debugging)
    pub fn print_config_sources(project_root: Option<&Path>) {
        println!("Configuration sources (in priority order):");

        if let Some(root) = project_root {
            match Self::project_config_path(root) {
                Some(path) => println!("  [FOUND] Project: {}", path.display()),
                None => println!(
                    "  [     ] Project: {}",
                    root.join(PROJECT_CONFIG_FILE).display()
                ),
            }
        }

        if let Some(path) = Self::global_config_path() {
            if path.exists() {
                println!("  [FOUND] Global:  {}", path.display());
            } else {
                println!("  [     ] Global:  {}", path.display());
            }
        }

        println!("  [     ] Default: built-in defaults");
    }
}

fn write_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use avakin_domain::ModelBackend;
    use std::collections::HashMap;

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert!(config.models.is_empty());
        assert_eq!(config.pipeline.max_review_revisions, 2);
    }

    #[test]
    fn test_global_config_path_returns_some() {
        let path = ConfigLoader::global_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("avakin"));
    }

    #[test]
    fn test_project_file_overrides_defaults_and_explicit_overrides_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "[router]\ntimeout_secs = 10\nmax_retries = 1\n",
        )
        .unwrap();
        let explicit = dir.path().join("explicit.toml");
        std::fs::write(&explicit, "[router]\nmax_retries = 7\n").unwrap();

        let config = ConfigLoader::files(Some(dir.path()), Some(&explicit))
            .extract::<FileConfig>()
            .unwrap();

        assert_eq!(config.router.timeout_secs, 10);
        assert_eq!(config.router.max_retries, 7);
        assert_eq!(config.router.initial_backoff_ms, 500);
    }

    #[test]
    fn test_save_bindings_preserves_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(
            &path,
            "[models.chat]\nmodel = \"openai/gpt-4o\"\n\n[pipeline]\nmax_fix_attempts = 9\n",
        )
        .unwrap();

        let mut bindings = HashMap::new();
        bindings.insert(
            AgentRole::Coder,
            RoleBinding::new(ModelBackend::local("ollama", "qwen2.5-coder")),
        );
        ConfigLoader::save_bindings(&path, &bindings).unwrap();

        let config = ConfigLoader::files(Some(dir.path()), None)
            .extract::<FileConfig>()
            .unwrap();
        assert_eq!(config.pipeline.max_fix_attempts, 9);
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models["coder"].model, "ollama/qwen2.5-coder");
    }
}
