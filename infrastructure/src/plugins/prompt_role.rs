//! Declarative agent roles (`prompt:<file>` entry points)

use super::validation::prompt_path;
use avakin_domain::{
    AgentRole, AgentRoleProvider, BuildStage, PluginDescriptor, PluginError, PluginValidationError,
};

/// An agent role defined entirely by its system prompt
#[derive(Debug, Clone)]
pub struct PromptRole {
    role: AgentRole,
    prompt: String,
    stage: Option<BuildStage>,
    temperature: Option<f32>,
}

impl PromptRole {
    pub fn new(
        role: AgentRole,
        prompt: impl Into<String>,
        stage: Option<BuildStage>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            role,
            prompt: prompt.into(),
            stage,
            temperature,
        }
    }

    /// Read the prompt file named by the entry point
    pub fn load(descriptor: &PluginDescriptor, file: &std::path::Path) -> Result<Self, PluginError> {
        let activation = |reason: String| PluginError::Activation {
            plugin: descriptor.name.clone(),
            reason,
        };
        let section = descriptor
            .agent_role
            .as_ref()
            .ok_or_else(|| activation("missing [agent_role] section".to_string()))?;
        let path = prompt_path(&descriptor.source_dir, file).ok_or_else(|| {
            PluginError::Validation(PluginValidationError::PromptOutsidePlugin {
                plugin: descriptor.name.clone(),
                path: file.display().to_string(),
            })
        })?;
        let prompt = std::fs::read_to_string(&path)
            .map_err(|e| activation(format!("{}: {}", path.display(), e)))?;
        if prompt.trim().is_empty() {
            return Err(activation(format!("{} is empty", path.display())));
        }
        Ok(Self::new(
            AgentRole::Custom(section.name.trim().to_string()),
            prompt.trim(),
            section.stage,
            section.temperature,
        ))
    }
}

impl AgentRoleProvider for PromptRole {
    fn role(&self) -> AgentRole {
        self.role.clone()
    }

    fn system_prompt(&self) -> &str {
        &self.prompt
    }

    fn stage(&self) -> Option<BuildStage> {
        self.stage
    }

    fn temperature(&self) -> Option<f32> {
        self.temperature
    }
}
