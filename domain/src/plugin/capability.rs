//! Capability interfaces implemented by plugins

use super::error::PluginError;
use crate::agent::role::AgentRole;
use crate::agent::stage::BuildStage;
use crate::knowledge::entities::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Declared capability of a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    AgentRole,
    Tool,
    Ingester,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::AgentRole => "agent-role",
            Capability::Tool => "tool",
            Capability::Ingester => "ingester",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "agent-role" | "role" => Ok(Capability::AgentRole),
            "tool" => Ok(Capability::Tool),
            "ingester" => Ok(Capability::Ingester),
            other => Err(format!("unknown capability '{}'", other)),
        }
    }
}

/// Contributes an additional agent role to the pipeline.
///
/// A role attached to a build stage runs after that stage's built-in role
/// and its output is merged into the stage result (for example an extra
/// reviewer whose revision requests count like the Reviewer's).
pub trait AgentRoleProvider: Send + Sync {
    fn role(&self) -> AgentRole;

    fn system_prompt(&self) -> &str;

    /// Stage the role participates in, if any
    fn stage(&self) -> Option<BuildStage> {
        None
    }

    fn temperature(&self) -> Option<f32> {
        None
    }
}

/// Input for a tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub project_root: PathBuf,
    /// Files written by the current run, project-relative
    pub changed_files: Vec<String>,
}

impl ToolInvocation {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            changed_files: Vec::new(),
        }
    }

    pub fn with_changed_files(mut self, files: Vec<String>) -> Self {
        self.changed_files = files;
        self
    }
}

/// Result of a tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// A tool the Validating stage runs before asking the Validator
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, PluginError>;
}

/// Turns a file the built-in ingesters don't understand into a [`Document`]
pub trait IngesterProvider: Send + Sync {
    fn name(&self) -> &str;

    fn handles(&self, path: &Path) -> bool;

    /// `id` is the document id the store will use
    fn extract(&self, id: &str, path: &Path, raw: &[u8]) -> Result<Document, PluginError>;
}
