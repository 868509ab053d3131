//! Configuration file loading for avakin
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. Environment: `GLOBAL_RAG_DB_PATH`, then `AVAKIN_*` variables
//! 2. `--config <path>` specified file
//! 3. Project root: `<project>/avakin.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/avakin/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigIssue, DEFAULT_MODEL, FileAnthropicConfig, FileCloudConfig, FileConfig,
    FileEmbeddingKind, FileKnowledgeConfig, FileLoggingConfig, FileOllamaConfig,
    FilePipelineConfig, FilePluginsConfig, FileProvidersConfig, FileReplConfig, FileRoleBinding,
    FileRouterConfig, GLOBAL_DB_ENV, Severity,
};
pub use loader::{ConfigLoader, ConfigSaveError, PROJECT_CONFIG_FILE};
