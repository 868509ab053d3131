//! Plugin descriptors and entry points

use super::capability::Capability;
use super::error::PluginValidationError;
use crate::agent::stage::BuildStage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// `[agent_role]` manifest section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRoleSection {
    pub name: String,
    #[serde(default)]
    pub stage: Option<BuildStage>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// `[tool]` manifest section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSection {
    /// argv for `command` entry points
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// `[ingester]` manifest section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngesterSection {
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// A discovered plugin candidate, as declared by its manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Raw entry point; parsed by [`EntryPoint::parse`]
    #[serde(default)]
    pub entry_point: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Semver requirement on the host version
    #[serde(default)]
    pub host_version: Option<String>,
    /// Directory the manifest was found in
    #[serde(skip)]
    pub source_dir: PathBuf,
    #[serde(default)]
    pub agent_role: Option<AgentRoleSection>,
    #[serde(default)]
    pub tool: Option<ToolSection>,
    #[serde(default)]
    pub ingester: Option<IngesterSection>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            capabilities: Vec::new(),
            entry_point: String::new(),
            dependencies: Vec::new(),
            host_version: None,
            source_dir: PathBuf::new(),
            agent_role: None,
            tool: None,
            ingester: None,
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn parsed_entry_point(&self) -> Result<EntryPoint, PluginValidationError> {
        EntryPoint::parse(&self.name, &self.entry_point)
    }
}

/// How a plugin's implementation is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// Compiled-in factory, `builtin:<id>`
    Builtin(String),
    /// Declarative agent role, `prompt:<file relative to the plugin dir>`
    Prompt(PathBuf),
    /// External process described by the `[tool]` section, `command`
    Command,
}

impl EntryPoint {
    pub fn parse(plugin: &str, raw: &str) -> Result<Self, PluginValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PluginValidationError::MissingEntryPoint {
                plugin: plugin.to_string(),
            });
        }
        if let Some(id) = raw.strip_prefix("builtin:") {
            return match id.trim() {
                "" => Err(PluginValidationError::MissingEntryPoint {
                    plugin: plugin.to_string(),
                }),
                id => Ok(EntryPoint::Builtin(id.to_string())),
            };
        }
        if let Some(file) = raw.strip_prefix("prompt:") {
            return match file.trim() {
                "" => Err(PluginValidationError::MissingEntryPoint {
                    plugin: plugin.to_string(),
                }),
                file => Ok(EntryPoint::Prompt(PathBuf::from(file))),
            };
        }
        if raw == "command" {
            return Ok(EntryPoint::Command);
        }
        Err(PluginValidationError::UnknownEntryPoint {
            plugin: plugin.to_string(),
            entry_point: raw.to_string(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EntryPoint::Builtin(_) => "builtin",
            EntryPoint::Prompt(_) => "prompt",
            EntryPoint::Command => "command",
        }
    }

    /// Whether this kind of entry point can implement `capability`.
    /// Built-ins are checked against their factory instead.
    pub fn supports(&self, capability: Capability) -> bool {
        match self {
            EntryPoint::Builtin(_) => true,
            EntryPoint::Prompt(_) => capability == Capability::AgentRole,
            EntryPoint::Command => capability == Capability::Tool,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPoint::Builtin(id) => write!(f, "builtin:{}", id),
            EntryPoint::Prompt(path) => write!(f, "prompt:{}", path.display()),
            EntryPoint::Command => f.write_str("command"),
        }
    }
}

/// Lifecycle state reported when listing plugins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginState {
    Active,
    Disabled,
    Invalid(String),
    Failed(String),
}

impl PluginState {
    pub fn is_active(&self) -> bool {
        matches!(self, PluginState::Active)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginState::Active => f.write_str("active"),
            PluginState::Disabled => f.write_str("disabled"),
            PluginState::Invalid(reason) => write!(f, "invalid: {}", reason),
            PluginState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
