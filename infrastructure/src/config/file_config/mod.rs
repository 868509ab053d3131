//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Conversion into application types happens here so the loader stays a
//! pure merge step.

mod knowledge;
mod logging;
mod models;
mod pipeline;
mod plugins;
mod providers;
mod repl;
mod router;

pub use knowledge::{FileEmbeddingKind, FileKnowledgeConfig, GLOBAL_DB_ENV};
pub use logging::FileLoggingConfig;
pub use models::{DEFAULT_MODEL, FileRoleBinding, role_bindings};
pub use pipeline::FilePipelineConfig;
pub use plugins::FilePluginsConfig;
pub use providers::{FileAnthropicConfig, FileCloudConfig, FileOllamaConfig, FileProvidersConfig};
pub use repl::FileReplConfig;
pub use router::FileRouterConfig;

use avakin_application::{PipelineSettings, RouterConfig};
use avakin_domain::{AgentRole, RoleBinding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A problem found while validating configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    /// Dotted path of the offending field, e.g. `models.coder.model`
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", level, self.field, self.message)
    }
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Role name -> binding
    pub models: BTreeMap<String, FileRoleBinding>,
    pub router: FileRouterConfig,
    pub pipeline: FilePipelineConfig,
    pub knowledge: FileKnowledgeConfig,
    pub plugins: FilePluginsConfig,
    pub providers: FileProvidersConfig,
    pub repl: FileReplConfig,
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = role_bindings(&self.models).1;

        if self.router.timeout_secs == 0 {
            issues.push(ConfigIssue::warning(
                "router.timeout_secs",
                "timeout of 0 seconds is raised to 1",
            ));
        }
        if self.knowledge.chunk_size == 0 {
            issues.push(ConfigIssue::error(
                "knowledge.chunk_size",
                "chunk size must be greater than 0",
            ));
        } else if self.knowledge.chunk_overlap >= self.knowledge.chunk_size {
            issues.push(ConfigIssue::error(
                "knowledge.chunk_overlap",
                format!(
                    "overlap {} must be smaller than chunk size {}",
                    self.knowledge.chunk_overlap, self.knowledge.chunk_size
                ),
            ));
        }
        if self.knowledge.dimensions == 0 {
            issues.push(ConfigIssue::error(
                "knowledge.dimensions",
                "embedding dimensions must be greater than 0",
            ));
        }

        issues
    }

    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|issue| issue.severity == Severity::Error)
    }

    /// Router configuration; invalid model entries are skipped
    pub fn router_config(&self) -> RouterConfig {
        let (bindings, _) = role_bindings(&self.models);
        bindings
            .into_iter()
            .fold(RouterConfig::new(), |config, (role, binding)| {
                config.with_binding(role, binding)
            })
            .with_retry(self.router.retry_policy())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        self.pipeline.settings()
    }

    /// Replace the `[models]` table with the router's current bindings
    pub fn set_bindings<'a>(&mut self, bindings: impl IntoIterator<Item = (&'a AgentRole, &'a RoleBinding)>) {
        self.models = bindings
            .into_iter()
            .map(|(role, binding)| (role.as_str().to_string(), FileRoleBinding::from_binding(binding)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[models.architect]
model = "anthropic/claude-sonnet-4-20250514"
fallback = "ollama/llama3.1"

[models.coder]
model = "deepseek/deepseek-chat"
temperature = 0.2

[router]
timeout_secs = 30

[pipeline]
max_review_revisions = 1
token_budget = 50000

[knowledge]
embedding = "ollama"
global_db_path = "/data/rag"

[repl]
show_progress = false
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.models.len(), 2);
        assert_eq!(config.router.timeout_secs, 30);
        assert_eq!(config.router.max_retries, 3);
        assert_eq!(config.pipeline.token_budget, Some(50_000));
        assert_eq!(config.knowledge.embedding, FileEmbeddingKind::Ollama);
        assert_eq!(config.knowledge.global_db_dir(), std::path::PathBuf::from("/data/rag"));
        assert!(!config.repl.show_progress);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_default_config_binds_every_builtin_role() {
        let config = FileConfig::default();
        let router = config.router_config();

        assert!(config.validate().is_empty());
        for role in AgentRole::builtin() {
            assert_eq!(router.bindings[&role].primary.label(), DEFAULT_MODEL);
        }
        assert_eq!(config.pipeline_settings(), PipelineSettings::default());
    }

    #[test]
    fn test_validate_reports_bad_chunking_and_models() {
        let mut config = FileConfig::default();
        config.knowledge.chunk_overlap = config.knowledge.chunk_size;
        config
            .models
            .insert("coder".to_string(), FileRoleBinding::new(""));

        let issues = config.validate();

        assert!(config.has_errors());
        assert!(issues.iter().any(|i| i.field == "knowledge.chunk_overlap"));
        assert!(issues.iter().any(|i| i.field == "models.coder.model"));
    }

    #[test]
    fn test_pipeline_settings_conversion() {
        let mut config = FileConfig::default();
        config.pipeline.max_fix_attempts = 5;
        config.pipeline.context_chunks = 0;

        let settings = config.pipeline_settings();

        assert_eq!(settings.limits.max_fix_attempts, 5);
        assert_eq!(settings.context_chunks, 0);
    }

    #[test]
    fn test_set_bindings_rewrites_models_table() {
        let mut config = FileConfig::default();
        config
            .models
            .insert("chat".to_string(), FileRoleBinding::new("openai/gpt-4o"));
        let router = RouterConfig::new().with_binding(
            AgentRole::Coder,
            RoleBinding::new(avakin_domain::ModelBackend::local("ollama", "qwen2.5-coder")),
        );

        config.set_bindings(&router.bindings);

        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models["coder"].model, "ollama/qwen2.5-coder");
    }
}
