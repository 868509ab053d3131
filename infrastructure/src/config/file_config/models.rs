//! Role-based model configuration from TOML (`[models]` section)

use super::{ConfigIssue, Severity};
use avakin_domain::{AgentRole, ModelBackend, RoleBinding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Model used for every built-in role that has no binding
pub const DEFAULT_MODEL: &str = "ollama/llama3.1";

/// One role's binding
///
/// # Example
///
/// ```toml
/// [models.architect]
/// model = "anthropic/claude-sonnet-4-20250514"
/// fallback = "ollama/llama3.1"
/// temperature = 0.3
///
/// [models.coder]
/// model = "deepseek/deepseek-chat"
/// api_key_env = "MY_DEEPSEEK_KEY"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRoleBinding {
    /// `provider/model`
    pub model: String,
    /// `provider/model` used when the primary is unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Base URL override for the primary backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key (never the key itself)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl FileRoleBinding {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Convert to a domain binding, reporting problems under `models.<role>`
    pub fn to_binding(&self, role: &str) -> (Option<RoleBinding>, Vec<ConfigIssue>) {
        let mut issues = Vec::new();

        let Some(mut primary) = parse_assignment(role, "model", &self.model, &mut issues) else {
            return (None, issues);
        };
        if let Some(endpoint) = &self.endpoint {
            primary = primary.with_endpoint(endpoint.clone());
        }
        if let Some(env) = &self.api_key_env {
            primary.api_key_env = Some(env.clone());
        }
        if let Some(t) = self.temperature {
            if (0.0..=2.0).contains(&t) {
                primary = primary.with_temperature(t);
            } else {
                issues.push(ConfigIssue::warning(
                    format!("models.{}.temperature", role),
                    format!("temperature {} is outside 0.0..=2.0, using the role default", t),
                ));
            }
        }

        let mut binding = RoleBinding::new(primary.clone());
        if let Some(fallback) = &self.fallback
            && let Some(mut backend) = parse_assignment(role, "fallback", fallback, &mut issues)
        {
            backend.temperature = primary.temperature;
            binding = binding.with_fallback(backend);
        }
        (Some(binding), issues)
    }

    /// Inverse of [`to_binding`](Self::to_binding), used when saving
    pub fn from_binding(binding: &RoleBinding) -> Self {
        let primary = &binding.primary;
        let default_env = (!primary.is_local())
            .then(|| avakin_domain::backend::default_key_env(&primary.provider));
        Self {
            model: primary.label(),
            fallback: binding.fallback.as_ref().map(|b| b.label()),
            temperature: primary.temperature,
            endpoint: primary.endpoint.clone(),
            api_key_env: primary
                .api_key_env
                .clone()
                .filter(|env| Some(env) != default_env.as_ref()),
        }
    }
}

fn parse_assignment(
    role: &str,
    field: &str,
    value: &str,
    issues: &mut Vec<ConfigIssue>,
) -> Option<ModelBackend> {
    if value.trim().is_empty() {
        issues.push(ConfigIssue::error(
            format!("models.{}.{}", role, field),
            "model name cannot be empty",
        ));
        return None;
    }
    let backend = ModelBackend::from_assignment(value);
    if backend.is_none() {
        issues.push(ConfigIssue::error(
            format!("models.{}.{}", role, field),
            format!("'{}' is not of the form provider/model", value),
        ));
    }
    backend
}

/// Bindings for every configured role, plus defaults for unbound
/// built-in roles.
pub fn role_bindings(
    models: &BTreeMap<String, FileRoleBinding>,
) -> (Vec<(AgentRole, RoleBinding)>, Vec<ConfigIssue>) {
    let mut bindings = Vec::new();
    let mut issues = Vec::new();

    for (name, entry) in models {
        let (binding, entry_issues) = entry.to_binding(name);
        issues.extend(entry_issues);
        if let Some(binding) = binding {
            // FromStr for AgentRole is infallible
            let role: AgentRole = name.parse().unwrap_or(AgentRole::Chat);
            bindings.push((role, binding));
        }
    }

    for role in AgentRole::builtin() {
        if !bindings.iter().any(|(r, _)| *r == role)
            && let Some(backend) = ModelBackend::from_assignment(DEFAULT_MODEL)
        {
            bindings.push((role, RoleBinding::new(backend)));
        }
    }

    (bindings, issues)
}
