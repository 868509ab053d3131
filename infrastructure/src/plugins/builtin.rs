//! Compiled-in plugin implementations, addressed as `builtin:<id>`

use super::command_tool::collect_output;
use super::prompt_role::PromptRole;
use async_trait::async_trait;
use avakin_domain::{
    AgentRole, Capability, Document, DocumentKind, IngesterProvider, PluginDescriptor,
    PluginError, ToolInvocation, ToolOutput, ToolProvider,
};
use std::path::Path;
use std::sync::Arc;

use super::registry::Contributions;

const PLACEHOLDER_CHECK: &str = "placeholder-check";
const TEXT_INGESTER: &str = "text-ingester";
const SECURITY_REVIEWER: &str = "security-reviewer";

const SECURITY_PROMPT: &str = r#"You are a security Reviewer. Look only for security problems: injection,
unsafe deserialization, secrets committed to source, path traversal, missing input
validation at trust boundaries. Ignore style."#;

/// Capabilities a built-in can provide; `None` for unknown ids
pub fn capabilities_of(id: &str) -> Option<&'static [Capability]> {
    match id {
        PLACEHOLDER_CHECK => Some(&[Capability::Tool]),
        TEXT_INGESTER => Some(&[Capability::Ingester]),
        SECURITY_REVIEWER => Some(&[Capability::AgentRole]),
        _ => None,
    }
}

/// Instantiate a validated built-in
pub fn instantiate(id: &str, descriptor: &PluginDescriptor) -> Result<Contributions, PluginError> {
    let activation = |reason: &str| PluginError::Activation {
        plugin: descriptor.name.clone(),
        reason: reason.to_string(),
    };
    let mut contributions = Contributions::default();
    match id {
        PLACEHOLDER_CHECK => {
            contributions.tool = Some(Arc::new(PlaceholderCheck {
                name: descriptor.name.clone(),
            }));
        }
        TEXT_INGESTER => {
            let section = descriptor
                .ingester
                .as_ref()
                .ok_or_else(|| activation("missing [ingester] section"))?;
            contributions.ingester = Some(Arc::new(TextIngester {
                name: descriptor.name.clone(),
                extensions: section
                    .extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                    .collect(),
            }));
        }
        SECURITY_REVIEWER => {
            let section = descriptor
                .agent_role
                .as_ref()
                .ok_or_else(|| activation("missing [agent_role] section"))?;
            contributions.role = Some(Arc::new(PromptRole::new(
                AgentRole::Custom(section.name.clone()),
                SECURITY_PROMPT,
                section.stage,
                section.temperature,
            )));
        }
        other => return Err(activation(&format!("unknown built-in '{}'", other))),
    }
    Ok(contributions)
}

/// Fails validation when generated files still contain stubs
struct PlaceholderCheck {
    name: String,
}

const PLACEHOLDER_MARKERS: &[&str] = &[
    "raise NotImplementedError",
    "todo!()",
    "unimplemented!()",
    "# TODO: implement",
    "// TODO: implement",
    "pass  # placeholder",
    "... # implementation",
];

fn find_placeholders(path: &str, content: &str) -> Vec<String> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| PLACEHOLDER_MARKERS.iter().any(|m| line.contains(m)))
        .map(|(no, line)| format!("{}:{}: {}", path, no + 1, line.trim()))
        .collect()
}

#[async_trait]
impl ToolProvider for PlaceholderCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Reports placeholder or stub code left in changed files"
    }

    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, PluginError> {
        let mut findings = Vec::new();
        for file in &invocation.changed_files {
            let Ok(content) = tokio::fs::read_to_string(invocation.project_root.join(file)).await
            else {
                continue;
            };
            findings.extend(find_placeholders(file, &content));
        }
        Ok(if findings.is_empty() {
            ToolOutput::success(format!(
                "No placeholders in {} file(s)",
                invocation.changed_files.len()
            ))
        } else {
            ToolOutput::failure(collect_output(&findings.join("\n"), ""))
        })
    }
}

/// Ingests extra plain-text extensions
struct TextIngester {
    name: String,
    extensions: Vec<String>,
}

impl IngesterProvider for TextIngester {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()))
    }

    fn extract(&self, id: &str, _path: &Path, raw: &[u8]) -> Result<Document, PluginError> {
        let text = std::str::from_utf8(raw).map_err(|_| PluginError::Execution {
            plugin: self.name.clone(),
            reason: format!("{} is not valid UTF-8", id),
        })?;
        Ok(Document::new(id, DocumentKind::Text, text))
    }
}
