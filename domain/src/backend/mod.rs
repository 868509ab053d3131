//! Model backend value objects
//!
//! A [`ModelBackend`] names a concrete language-model endpoint. Credentials
//! are never stored here: cloud backends only carry the *name* of the
//! environment variable holding the key, resolved at call time.

use serde::{Deserialize, Serialize};

/// Where a backend runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Locally running model-serving daemon
    #[default]
    Local,
    /// Hosted provider API
    Cloud,
}

impl BackendKind {
    pub fn as_str(&self) -> &str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Cloud => "cloud",
        }
    }
}

/// A concrete model endpoint bound to an agent role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBackend {
    pub kind: BackendKind,
    /// Provider identifier ("ollama", "openai", "anthropic", "deepseek", ...)
    pub provider: String,
    /// Model name as understood by the provider
    pub model: String,
    /// Endpoint override (base URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ModelBackend {
    pub fn local(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::Local,
            provider: provider.into(),
            model: model.into(),
            endpoint: None,
            api_key_env: None,
            temperature: None,
        }
    }

    pub fn cloud(
        provider: impl Into<String>,
        model: impl Into<String>,
        api_key_env: impl Into<String>,
    ) -> Self {
        Self {
            kind: BackendKind::Cloud,
            provider: provider.into(),
            model: model.into(),
            endpoint: None,
            api_key_env: Some(api_key_env.into()),
            temperature: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Parse a `provider/model` assignment string.
    ///
    /// `ollama/...` is local; well-known cloud providers get their
    /// conventional key variable. Returns `None` without a `/`.
    pub fn from_assignment(assignment: &str) -> Option<Self> {
        let (provider, model) = assignment.trim().split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        let backend = match provider {
            "ollama" => Self::local(provider, model),
            _ => Self::cloud(provider, model, default_key_env(provider)),
        };
        Some(backend)
    }

    /// `provider/model` label used in logs and listings
    pub fn label(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }

    pub fn is_local(&self) -> bool {
        self.kind == BackendKind::Local
    }
}

impl std::fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label(), self.kind.as_str())
    }
}

/// Conventional API key variable for a cloud provider
pub fn default_key_env(provider: &str) -> String {
    match provider {
        "openai" => "OPENAI_API_KEY".to_string(),
        "anthropic" => "ANTHROPIC_API_KEY".to_string(),
        "deepseek" => "DEEPSEEK_API_KEY".to_string(),
        "google" | "gemini" => "GEMINI_API_KEY".to_string(),
        other => format!("{}_API_KEY", other.to_ascii_uppercase().replace('-', "_")),
    }
}

/// Backend assignment for one role: a primary plus an optional fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub primary: ModelBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ModelBackend>,
}

impl RoleBinding {
    pub fn new(primary: ModelBackend) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: ModelBackend) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_assignment_local() {
        let backend = ModelBackend::from_assignment("ollama/qwen2.5-coder:7b").unwrap();
        assert_eq!(backend.kind, BackendKind::Local);
        assert_eq!(backend.model, "qwen2.5-coder:7b");
        assert!(backend.api_key_env.is_none());
    }

    #[test]
    fn test_from_assignment_cloud_uses_key_reference() {
        let backend = ModelBackend::from_assignment("anthropic/claude-3-5-sonnet").unwrap();
        assert_eq!(backend.kind, BackendKind::Cloud);
        assert_eq!(backend.api_key_env.as_deref(), Some("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_from_assignment_rejects_bare_name() {
        assert!(ModelBackend::from_assignment("gpt-4o").is_none());
        assert!(ModelBackend::from_assignment("openai/").is_none());
    }

    #[test]
    fn test_default_key_env_for_unknown_provider() {
        assert_eq!(default_key_env("my-host"), "MY_HOST_API_KEY");
    }
}
