//! Project entity

use super::conversation::ConversationHistory;
use crate::agent::stage::PlanState;
use crate::blueprint::Blueprint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory under the project root holding avakin state
pub const STATE_DIR: &str = ".avakin";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from the project directory name
    pub fn from_root(root: &Path) -> Self {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("project");
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Top-level interaction mode of a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Plan,
    Build,
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionMode::Plan => f.write_str("plan"),
            InteractionMode::Build => f.write_str("build"),
        }
    }
}

/// An open project
#[derive(Debug, Clone)]
pub struct Project {
    pub id: ProjectId,
    pub root: PathBuf,
    pub mode: InteractionMode,
    pub plan_state: PlanState,
    /// Current draft (Plan mode) or the approved blueprint (Build mode)
    pub blueprint: Option<Blueprint>,
    pub history: ConversationHistory,
}

impl Project {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            id: ProjectId::from_root(&root),
            root,
            mode: InteractionMode::Plan,
            plan_state: PlanState::Listening,
            blueprint: None,
            history: ConversationHistory::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ProjectId>) -> Self {
        self.id = id.into();
        self
    }

    /// Resume in Build mode with a previously approved blueprint
    pub fn with_approved_blueprint(mut self, blueprint: Blueprint) -> Self {
        self.blueprint = Some(blueprint);
        self.mode = InteractionMode::Build;
        self
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Isolated knowledge store directory of this project
    pub fn knowledge_dir(&self) -> PathBuf {
        self.state_dir().join("rag_db")
    }

    pub fn blueprint_path(&self) -> PathBuf {
        self.state_dir().join("blueprint.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_project_defaults() {
        let project = Project::open("/work/todo-app");
        assert_eq!(project.id.as_str(), "todo-app");
        assert_eq!(project.mode, InteractionMode::Plan);
        assert_eq!(project.plan_state, PlanState::Listening);
        assert!(project.history.is_empty());
        assert_eq!(
            project.knowledge_dir(),
            PathBuf::from("/work/todo-app/.avakin/rag_db")
        );
    }

    #[test]
    fn test_project_id_from_root_fallback() {
        assert_eq!(ProjectId::from_root(Path::new("/")).as_str(), "project");
    }
}
