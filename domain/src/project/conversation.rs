//! Conversation history
//!
//! Turns are immutable once appended; append order is the only ordering.

use crate::agent::role::AgentRole;
use crate::agent::stage::{BuildStage, PlanState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Agent,
}

/// Pipeline stage a turn originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "stage", rename_all = "lowercase")]
pub enum TurnOrigin {
    Plan(PlanState),
    Build(BuildStage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    /// Agent role that produced the turn (agent turns only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentRole>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub origin: TurnOrigin,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>, origin: TurnOrigin) -> Self {
        Self {
            role: TurnRole::User,
            agent: None,
            content: content.into(),
            image: None,
            timestamp: Utc::now(),
            origin,
        }
    }

    pub fn agent(agent: AgentRole, content: impl Into<String>, origin: TurnOrigin) -> Self {
        Self {
            role: TurnRole::Agent,
            agent: Some(agent),
            content: content.into(),
            image: None,
            timestamp: Utc::now(),
            origin,
        }
    }

    pub fn with_image(mut self, reference: impl Into<String>) -> Self {
        self.image = Some(reference.into());
        self
    }

    pub fn speaker(&self) -> &str {
        match (&self.role, &self.agent) {
            (TurnRole::User, _) => "User",
            (TurnRole::Agent, Some(agent)) => agent.display_name(),
            (TurnRole::Agent, None) => "Agent",
        }
    }
}

/// Ordered, append-only sequence of turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// The most recent `n` turns, oldest first
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Render the most recent turns as a transcript for prompts
    pub fn transcript(&self, max_turns: usize) -> String {
        self.recent(max_turns)
            .iter()
            .map(|t| format!("{}: {}", t.speaker(), t.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> TurnOrigin {
        TurnOrigin::Plan(PlanState::Listening)
    }

    #[test]
    fn test_append_preserves_order() {
        let mut history = ConversationHistory::new();
        history.append(ConversationTurn::user("first", plan()));
        history.append(ConversationTurn::agent(AgentRole::Architect, "second", plan()));
        history.append(ConversationTurn::user("third", plan()));

        let contents: Vec<_> = history.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert_eq!(history.recent(2).len(), 2);
        assert_eq!(history.recent(2)[0].content, "second");
    }

    #[test]
    fn test_transcript_names_speakers() {
        let mut history = ConversationHistory::new();
        history.append(ConversationTurn::user("build a todo app", plan()));
        history.append(ConversationTurn::agent(AgentRole::Chat, "sure", plan()));
        assert_eq!(history.transcript(10), "User: build a todo app\n\nChat: sure");
    }

    #[test]
    fn test_turn_serializes_origin() {
        let turn = ConversationTurn::agent(
            AgentRole::Coder,
            "done",
            TurnOrigin::Build(BuildStage::Coding),
        );
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["origin"]["mode"], "build");
        assert_eq!(json["origin"]["stage"], "coding");
        assert_eq!(json["agent"], "coder");
    }
}
