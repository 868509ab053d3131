//! Plan-mode and Build-mode stage machines

use super::role::AgentRole;
use serde::{Deserialize, Serialize};

/// State of the Plan-mode conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    /// Waiting for the next user message
    #[default]
    Listening,
    /// The Architect is producing or updating a blueprint fragment
    Drafting,
    /// A valid blueprint draft exists and awaits user approval
    AwaitingApproval,
}

impl PlanState {
    pub fn as_str(&self) -> &str {
        match self {
            PlanState::Listening => "listening",
            PlanState::Drafting => "drafting",
            PlanState::AwaitingApproval => "awaiting_approval",
        }
    }
}

impl std::fmt::Display for PlanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stage of a Build-mode pipeline run
///
/// ```text
/// Scaffolding -> Coding -> Reviewing -> Validating -> Done
///                  ^          |             |
///                  +----------+-------------+   (bounded back-edges)
///
/// any non-terminal stage -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Scaffolding,
    Coding,
    Reviewing,
    Validating,
    Done,
    Failed,
}

impl BuildStage {
    pub fn as_str(&self) -> &str {
        match self {
            BuildStage::Scaffolding => "scaffolding",
            BuildStage::Coding => "coding",
            BuildStage::Reviewing => "reviewing",
            BuildStage::Validating => "validating",
            BuildStage::Done => "done",
            BuildStage::Failed => "failed",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            BuildStage::Scaffolding => "Scaffolding",
            BuildStage::Coding => "Coding",
            BuildStage::Reviewing => "Reviewing",
            BuildStage::Validating => "Validating",
            BuildStage::Done => "Done",
            BuildStage::Failed => "Failed",
        }
    }

    /// Role that executes this stage
    pub fn role(&self) -> Option<AgentRole> {
        match self {
            BuildStage::Scaffolding => Some(AgentRole::Architect),
            BuildStage::Coding => Some(AgentRole::Coder),
            BuildStage::Reviewing => Some(AgentRole::Reviewer),
            BuildStage::Validating => Some(AgentRole::Validator),
            BuildStage::Done | BuildStage::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStage::Done | BuildStage::Failed)
    }

    /// Check whether `next` is a legal successor of this stage
    pub fn can_transition_to(&self, next: BuildStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == BuildStage::Failed {
            return true;
        }
        matches!(
            (self, next),
            (BuildStage::Scaffolding, BuildStage::Coding)
                | (BuildStage::Coding, BuildStage::Reviewing)
                | (BuildStage::Reviewing, BuildStage::Coding)
                | (BuildStage::Reviewing, BuildStage::Validating)
                | (BuildStage::Validating, BuildStage::Coding)
                | (BuildStage::Validating, BuildStage::Done)
        )
    }
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(BuildStage::Scaffolding.can_transition_to(BuildStage::Coding));
        assert!(BuildStage::Coding.can_transition_to(BuildStage::Reviewing));
        assert!(BuildStage::Reviewing.can_transition_to(BuildStage::Validating));
        assert!(BuildStage::Validating.can_transition_to(BuildStage::Done));
    }

    #[test]
    fn test_back_edges() {
        assert!(BuildStage::Reviewing.can_transition_to(BuildStage::Coding));
        assert!(BuildStage::Validating.can_transition_to(BuildStage::Coding));
        assert!(!BuildStage::Coding.can_transition_to(BuildStage::Scaffolding));
        assert!(!BuildStage::Scaffolding.can_transition_to(BuildStage::Done));
    }

    #[test]
    fn test_terminal_stages_are_final() {
        assert!(!BuildStage::Done.can_transition_to(BuildStage::Coding));
        assert!(!BuildStage::Failed.can_transition_to(BuildStage::Failed));
        assert!(BuildStage::Coding.can_transition_to(BuildStage::Failed));
    }

    #[test]
    fn test_stage_roles() {
        assert_eq!(BuildStage::Coding.role(), Some(AgentRole::Coder));
        assert_eq!(BuildStage::Done.role(), None);
    }
}
