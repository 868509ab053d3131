//! Provider endpoints from TOML (`[providers]` section)
//!
//! API keys are never read from configuration files. Each cloud provider
//! names the environment variable holding its key.

use serde::{Deserialize, Serialize};

/// Local Ollama daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOllamaConfig {
    /// Base URL (`OLLAMA_API_BASE` overrides the default)
    pub base_url: Option<String>,
}

/// An OpenAI-compatible chat completions API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCloudConfig {
    /// Environment variable name for the API key
    pub api_key_env: String,
    pub base_url: String,
    /// Models listed by `avakin models` when the key is set
    pub models: Vec<String>,
}

impl FileCloudConfig {
    fn new(api_key_env: &str, base_url: &str, models: &[&str]) -> Self {
        Self {
            api_key_env: api_key_env.to_string(),
            base_url: base_url.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn openai() -> Self {
        Self::new(
            "OPENAI_API_KEY",
            "https://api.openai.com/v1",
            &["gpt-4o", "gpt-4o-mini", "o3-mini"],
        )
    }

    pub fn deepseek() -> Self {
        Self::new(
            "DEEPSEEK_API_KEY",
            "https://api.deepseek.com/v1",
            &["deepseek-chat", "deepseek-reasoner"],
        )
    }
}

/// Anthropic Messages API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAnthropicConfig {
    /// Environment variable name for the API key (default: "ANTHROPIC_API_KEY")
    pub api_key_env: String,
    pub base_url: String,
    /// Max tokens per response
    pub max_tokens: u32,
    /// `anthropic-version` header
    pub api_version: String,
    pub models: Vec<String>,
}

impl Default for FileAnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8192,
            api_version: "2023-06-01".to_string(),
            models: vec![
                "claude-sonnet-4-20250514".to_string(),
                "claude-3-5-haiku-latest".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProvidersConfig {
    pub ollama: FileOllamaConfig,
    pub openai: FileCloudConfig,
    pub deepseek: FileCloudConfig,
    pub anthropic: FileAnthropicConfig,
}

impl Default for FileProvidersConfig {
    fn default() -> Self {
        Self {
            ollama: FileOllamaConfig::default(),
            openai: FileCloudConfig::openai(),
            deepseek: FileCloudConfig::deepseek(),
            anthropic: FileAnthropicConfig::default(),
        }
    }
}
